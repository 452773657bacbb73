use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Ident, LitStr};

use crate::parser::{CommandDef, EnumDef, Field, FieldTy, MessageDef, ScalarTy, Scheme};

const ARGS_POSTFIX: &str = "CommandArgs";
const DATA_POSTFIX: &str = "ResponseData";
const RESPONSE_POSTFIX: &str = "CommandResponse";
const COMMAND_POSTFIX: &str = "Command";

/// Entry point for codegen
pub fn gen(scheme: &Scheme) -> String {
    let enums = scheme.enums.iter().map(enum_def::gen);
    let messages = scheme.messages.iter().map(message_def::gen);
    let commands = scheme.commands.iter().map(command_def::gen);
    let catalog = catalog::gen(scheme);
    let client = client::gen(&scheme.commands);
    let server = server::gen(&scheme.commands);

    quote!(
        #( #enums )*
        #( #messages )*
        #( #commands )*
        #catalog
        #client
        #server
    )
    .to_string()
}

fn ident(name: &str) -> Ident {
    // keywords such as `type` become raw identifiers
    match syn::parse_str::<Ident>(name) {
        Ok(_) => Ident::new(name, Span::call_site()),
        Err(_) => Ident::new_raw(name, Span::call_site()),
    }
}

fn lit(s: &str) -> LitStr {
    LitStr::new(s, Span::call_site())
}

/// Generation of enumerations
mod enum_def {
    use super::*;

    pub fn gen(def: &EnumDef) -> TokenStream {
        let name = ident(&def.name);
        let variants: Vec<Ident> = def.values.iter().map(|v| ident(v)).collect();
        let names: Vec<LitStr> = def.values.iter().map(|v| lit(v)).collect();
        let numbers = (0..def.values.len()).map(|n| n as i32);
        let first = &variants[0];

        quote!(
            #[repr(i32)]
            #[allow(non_camel_case_types)]
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::num_enum::FromPrimitive, ::num_enum::IntoPrimitive)]
            pub enum #name {
                #( #variants = #numbers, )*
                #[num_enum(default)]
                UNRECOGNIZED = -1,
            }

            impl Default for #name {
                fn default() -> Self {
                    #name::#first
                }
            }

            impl ::obcwire::Enumeration for #name {
                fn from_i32(value: i32) -> Self {
                    Self::from(value)
                }

                fn to_i32(self) -> i32 {
                    self.into()
                }

                fn as_str_name(self) -> &'static str {
                    match self {
                        #( #name::#variants => #names, )*
                        #name::UNRECOGNIZED => "UNRECOGNIZED",
                    }
                }

                fn from_str_name(name: &str) -> Self {
                    match name {
                        #( #names => #name::#variants, )*
                        _ => #name::UNRECOGNIZED,
                    }
                }
            }
        )
    }
}

/// Rust type of a field.
fn field_ty(f: &Field) -> TokenStream {
    let element = match &f.ty {
        FieldTy::Scalar(s) => scalar_ty(*s),
        FieldTy::Timestamp => {
            quote!(Option<::obcwire::chrono::DateTime<::obcwire::chrono::Utc>>)
        }
        FieldTy::Enum(name) => {
            let name = ident(name);
            quote!(#name)
        }
        FieldTy::Message(name) if f.repeated => {
            let name = ident(name);
            quote!(#name)
        }
        FieldTy::Message(name) => {
            let name = ident(name);
            quote!(Option<#name>)
        }
    };
    if f.repeated {
        quote!(Vec<#element>)
    } else {
        element
    }
}

fn scalar_ty(ty: ScalarTy) -> TokenStream {
    match ty {
        ScalarTy::Uint32 => quote!(u32),
        ScalarTy::Uint64 => quote!(u64),
        ScalarTy::Sint32 => quote!(i32),
        ScalarTy::Sint64 => quote!(i64),
        ScalarTy::Bool => quote!(bool),
        ScalarTy::Double => quote!(f64),
        ScalarTy::String => quote!(String),
        ScalarTy::Bytes => quote!(Vec<u8>),
    }
}

/// `::obcwire::Kind` expression of a field.
fn field_kind(ty: &FieldTy) -> TokenStream {
    match ty {
        FieldTy::Scalar(s) => {
            let variant = ident(match s {
                ScalarTy::Uint32 => "Uint32",
                ScalarTy::Uint64 => "Uint64",
                ScalarTy::Sint32 => "Sint32",
                ScalarTy::Sint64 => "Sint64",
                ScalarTy::Bool => "Bool",
                ScalarTy::Double => "Double",
                ScalarTy::String => "String",
                ScalarTy::Bytes => "Bytes",
            });
            quote!(::obcwire::Kind::#variant)
        }
        FieldTy::Timestamp => quote!(::obcwire::Kind::Timestamp),
        FieldTy::Enum(name) => {
            let name = lit(name);
            quote!(::obcwire::Kind::Enum(#name))
        }
        FieldTy::Message(name) => {
            let name = lit(name);
            quote!(::obcwire::Kind::Message(#name))
        }
    }
}

/// Generation of message structs and their `Message` impls
mod message_def {
    use super::*;

    pub fn gen(def: &MessageDef) -> TokenStream {
        gen_struct(&def.name, &def.fields, quote!())
    }

    /// Struct, descriptor and field access for `fields`. `extra` lands
    /// after the `Message` impl.
    pub fn gen_struct(name: &str, fields: &[Field], extra: TokenStream) -> TokenStream {
        let name_lit = lit(name);
        let name = ident(name);
        let members: Vec<Ident> = fields.iter().map(|f| ident(&snake_case_name(&f.json_name))).collect();
        let member_names: Vec<LitStr> = fields.iter().map(|f| lit(&snake_case_name(&f.json_name))).collect();
        let json_names: Vec<LitStr> = fields.iter().map(|f| lit(&f.json_name)).collect();
        let numbers: Vec<u32> = fields.iter().map(|f| f.number).collect();
        let tys = fields.iter().map(field_ty);
        let kinds = fields.iter().map(|f| field_kind(&f.ty));
        let repeated = fields.iter().map(|f| if f.repeated { quote!(.repeated()) } else { quote!() });
        let count = fields.len();

        let (field_body, field_mut_body) = if fields.is_empty() {
            (quote!(let _ = number; None), quote!(let _ = number; None))
        } else {
            (
                quote!(
                    Some(match number {
                        #( #numbers => &self.#members as &dyn ::obcwire::FieldValue, )*
                        _ => return None,
                    })
                ),
                quote!(
                    Some(match number {
                        #( #numbers => &mut self.#members as &mut dyn ::obcwire::FieldValue, )*
                        _ => return None,
                    })
                ),
            )
        };

        quote!(
            #[derive(Clone, Debug, Default, PartialEq)]
            pub struct #name {
                #( pub #members: #tys, )*
            }

            impl ::obcwire::Message for #name {
                fn descriptor() -> ::obcwire::MessageDescriptor {
                    static FIELDS: [::obcwire::FieldDescriptor; #count] = [
                        #( ::obcwire::FieldDescriptor::new(#numbers, #member_names, #json_names, #kinds)#repeated, )*
                    ];
                    ::obcwire::MessageDescriptor {
                        name: #name_lit,
                        fields: &FIELDS,
                    }
                }

                fn field(&self, number: u32) -> Option<&dyn ::obcwire::FieldValue> {
                    #field_body
                }

                fn field_mut(&mut self, number: u32) -> Option<&mut dyn ::obcwire::FieldValue> {
                    #field_mut_body
                }
            }

            #extra
        )
    }
}

/// Args, payload, response alias and `Command` impl of one command
mod command_def {
    use super::*;

    pub fn gen(cmd: &CommandDef) -> TokenStream {
        let pascal = pascal_case_name(&cmd.name);
        let args_name = pascal.clone() + ARGS_POSTFIX;
        let args_ident = ident(&args_name);
        let response_name = pascal.clone() + RESPONSE_POSTFIX;
        let response_ident = ident(&response_name);
        let command_ident = ident(&(pascal.clone() + COMMAND_POSTFIX));
        let name_lit = lit(&cmd.name);
        let id = cmd.id;

        let mut args_fields = vec![
            Field {
                json_name: "timeout".into(),
                number: 1,
                ty: FieldTy::Scalar(ScalarTy::Uint64),
                repeated: false,
            },
            Field {
                json_name: "dateTime".into(),
                number: 2,
                ty: FieldTy::Timestamp,
                repeated: false,
            },
        ];
        args_fields.extend(cmd.args.iter().cloned());
        let args = message_def::gen_struct(
            &args_name,
            &args_fields,
            quote!(
                impl ::obcwire::CommandArgs for #args_ident {
                    fn timeout(&self) -> u64 {
                        self.timeout
                    }

                    fn date_time(&self) -> Option<::obcwire::chrono::DateTime<::obcwire::chrono::Utc>> {
                        self.date_time
                    }
                }
            ),
        );

        let (data, data_ty) = match &cmd.data {
            Some(fields) => {
                let data_name = pascal + DATA_POSTFIX;
                let data_ident = ident(&data_name);
                let data_lit = lit(&data_name);
                let response_lit = lit(&response_name);
                let data = message_def::gen_struct(
                    &data_name,
                    fields,
                    quote!(
                        impl ::obcwire::Payload for #data_ident {
                            const RESPONSE: ::obcwire::MessageDescriptor = ::obcwire::MessageDescriptor {
                                name: #response_lit,
                                fields: &::obcwire::response_fields(#data_lit),
                            };
                        }
                    ),
                );
                (data, quote!(#data_ident))
            }
            None => (quote!(), quote!(::obcwire::Empty)),
        };

        quote!(
            #args
            #data

            pub type #response_ident = ::obcwire::Response<#data_ty>;

            pub struct #command_ident;

            impl ::obcwire::Command for #command_ident {
                const NAME: &'static str = #name_lit;
                const ID: u32 = #id;
                type Args = #args_ident;
                type Data = #data_ty;
            }
        )
    }
}

/// Static catalog and lookups by name
mod catalog {
    use super::*;

    pub fn gen(scheme: &Scheme) -> TokenStream {
        let cmds = &scheme.commands;
        let count = cmds.len();
        let names: Vec<LitStr> = cmds.iter().map(|c| lit(&c.name)).collect();
        let ids = cmds.iter().map(|c| c.id);
        let pascal: Vec<String> = cmds.iter().map(|c| pascal_case_name(&c.name)).collect();
        let args_lits = pascal.iter().map(|p| lit(&(p.clone() + ARGS_POSTFIX)));
        let response_lits = pascal.iter().map(|p| lit(&(p.clone() + RESPONSE_POSTFIX)));
        let command_idents: Vec<Ident> = pascal.iter().map(|p| ident(&(p.clone() + COMMAND_POSTFIX))).collect();

        // every named message type, with the Rust type that implements it
        let mut type_names = vec![lit("OBCResponseDataHeader")];
        let mut types = vec![quote!(::obcwire::ObcResponseDataHeader)];
        for m in &scheme.messages {
            type_names.push(lit(&m.name));
            let ty = ident(&m.name);
            types.push(quote!(#ty));
        }
        for (c, p) in cmds.iter().zip(&pascal) {
            for postfix in [ARGS_POSTFIX, RESPONSE_POSTFIX] {
                let name = p.clone() + postfix;
                let ty = ident(&name);
                type_names.push(lit(&name));
                types.push(quote!(#ty));
            }
            if c.data.is_some() {
                let name = p.clone() + DATA_POSTFIX;
                let ty = ident(&name);
                type_names.push(lit(&name));
                types.push(quote!(#ty));
            }
        }

        quote!(
            pub static COMMANDS: [::obcwire::CommandInfo; #count] = [
                #( ::obcwire::CommandInfo::unary(#names, #ids, #args_lits, #response_lits), )*
            ];

            pub static CATALOG: ::obcwire::Catalog = ::obcwire::Catalog::new(&COMMANDS);

            /// Codec of the message type called `name`.
            pub fn message_codec(name: &str) -> Option<::obcwire::MessageCodec> {
                Some(match name {
                    #( #type_names => ::obcwire::MessageCodec::of::<#types>(), )*
                    _ => return None,
                })
            }

            pub fn message_descriptor(name: &str) -> Option<::obcwire::MessageDescriptor> {
                message_codec(name).map(|codec| (codec.descriptor)())
            }

            /// Args and response codecs of the command called `command`.
            pub fn command_codecs(command: &str) -> Option<::obcwire::CommandCodecs> {
                Some(match command {
                    #( #names => ::obcwire::CommandCodecs::of::<#command_idents>(), )*
                    _ => return None,
                })
            }
        )
    }
}

fn method_parts(cmds: &[CommandDef]) -> (Vec<Ident>, Vec<Ident>, Vec<Ident>, Vec<Ident>) {
    let mut methods = Vec::new();
    let mut commands = Vec::new();
    let mut args = Vec::new();
    let mut responses = Vec::new();
    for c in cmds {
        let pascal = pascal_case_name(&c.name);
        methods.push(ident(&snake_case_name(&c.name)));
        commands.push(ident(&(pascal.clone() + COMMAND_POSTFIX)));
        args.push(ident(&(pascal.clone() + ARGS_POSTFIX)));
        responses.push(ident(&(pascal + RESPONSE_POSTFIX)));
    }
    (methods, commands, args, responses)
}

/// Typed client wrapper
mod client {
    use super::*;

    pub fn gen(cmds: &[CommandDef]) -> TokenStream {
        let (methods, commands, args, responses) = method_parts(cmds);

        quote!(
            pub struct ObcClient<T> {
                inner: ::obcwire::Client<T>,
            }

            impl<T: ::obcwire::Transport> ObcClient<T> {
                pub fn new(transport: T) -> Self {
                    Self { inner: ::obcwire::Client::new(transport) }
                }

                pub fn with_config(transport: T, config: ::obcwire::CodecConfig) -> Self {
                    Self { inner: ::obcwire::Client::with_config(transport, config) }
                }

                pub fn inner(&self) -> &::obcwire::Client<T> {
                    &self.inner
                }

                #(
                    pub async fn #methods(&self, args: &#args) -> Result<#responses, ::obcwire::CallError> {
                        self.inner.call::<#commands>(args).await
                    }
                )*
            }
        )
    }
}

/// Service trait and the dispatcher routing to it
mod server {
    use super::*;

    pub fn gen(cmds: &[CommandDef]) -> TokenStream {
        let (methods, commands, args, responses) = method_parts(cmds);
        let names: Vec<LitStr> = cmds.iter().map(|c| lit(&c.name)).collect();

        quote!(
            /// OBC side of the protocol. Unimplemented commands answer `NOT_IMPL`.
            #[::async_trait::async_trait]
            pub trait ObcService: Send + Sync {
                #(
                    async fn #methods(&self, _args: #args) -> #responses {
                        ::obcwire::not_implemented::<#commands>()
                    }
                )*
            }

            pub struct ObcServer<S> {
                service: S,
                ctx: ::obcwire::ServerContext,
            }

            impl<S: ObcService> ObcServer<S> {
                pub fn new(service: S) -> Self {
                    Self::with_config(service, ::obcwire::CodecConfig::default())
                }

                pub fn with_config(service: S, config: ::obcwire::CodecConfig) -> Self {
                    Self { service, ctx: ::obcwire::ServerContext::new(config) }
                }

                pub fn service(&self) -> &S {
                    &self.service
                }

                pub fn context(&self) -> &::obcwire::ServerContext {
                    &self.ctx
                }
            }

            #[::async_trait::async_trait]
            impl<S: ObcService> ::obcwire::Dispatch for ObcServer<S> {
                async fn dispatch(&self, command: &str, request: Vec<u8>) -> Result<Vec<u8>, ::obcwire::CallError> {
                    match command {
                        #(
                            #names => {
                                self.ctx
                                    .serve::<#commands, _, _>(&request, |args| self.service.#methods(args))
                                    .await
                            }
                        )*
                        other => Ok(self.ctx.command_not_found(other)),
                    }
                }
            }
        )
    }
}

/// `getFwInfo` -> `GetFwInfo`, `gps_config` -> `GpsConfig`
pub fn pascal_case_name(name: &str) -> String {
    let empty = String::with_capacity(name.len());
    name.split('_').fold(empty, |acc, s| {
        let mut c = s.chars();
        let s = match c.next() {
            None => String::new(),
            Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
        };
        acc + &s
    })
}

/// `execDatetime` -> `exec_datetime`, `getFwInfo` -> `get_fw_info`
pub fn snake_case_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
