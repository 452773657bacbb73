use std::collections::BTreeSet;

use serde_json::{map::Map, Value as JsonValue};
use thiserror::Error;

use crate::gen::{pascal_case_name, snake_case_name};

const ANNOTATION_TOKEN: &str = "@";
const ANNOTATION_ID_STR: &str = "@id";
const ANNOTATION_NUMBER_STR: &str = "@number";
const ANNOTATION_TYPE_STR: &str = "@type";
const REPEATED_PREFIX: &str = "repeated ";
const NUMBER_DELIMETR: char = ':';

/// Keywords that stay invalid even as raw identifiers.
const UNUSABLE_IDENTS: [&str; 5] = ["self", "Self", "super", "crate", "_"];

/// Numbers 1 and 2 of every args message are `timeout` and `dateTime`.
pub const FIRST_ARGS_FIELD: u32 = 3;

#[derive(Debug, Error)]
pub enum SchemeError {
    #[error("scheme is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{context}: {reason}")]
    Malformed { context: String, reason: String },
    #[error("{context}: unknown type `{ty}`")]
    UnknownType { context: String, ty: String },
    #[error("{context}: field number {number} is used twice")]
    DuplicateNumber { context: String, number: u32 },
    #[error("duplicate {what} `{name}`")]
    Duplicate { what: &'static str, name: String },
    #[error("{context}: `{name}` cannot be a Rust identifier")]
    BadName { context: String, name: String },
}

fn malformed(context: &str, reason: impl Into<String>) -> SchemeError {
    SchemeError::Malformed {
        context: context.to_string(),
        reason: reason.into(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarTy {
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Bool,
    Double,
    String,
    Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldTy {
    Scalar(ScalarTy),
    Timestamp,
    Enum(String),
    Message(String),
}

#[derive(Clone, Debug)]
pub struct Field {
    /// lowerCamelCase key, as written in the scheme.
    pub json_name: String,
    pub number: u32,
    pub ty: FieldTy,
    pub repeated: bool,
}

#[derive(Clone, Debug)]
pub struct EnumDef {
    pub name: String,
    /// Symbolic values; the index is the wire number.
    pub values: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct MessageDef {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug)]
pub struct CommandDef {
    pub name: String,
    pub id: u32,
    /// Command-specific args, numbered from 3.
    pub args: Vec<Field>,
    /// `None` when the command returns only the envelope.
    pub data: Option<Vec<Field>>,
}

#[derive(Clone, Debug, Default)]
pub struct Scheme {
    pub enums: Vec<EnumDef>,
    pub messages: Vec<MessageDef>,
    pub commands: Vec<CommandDef>,
}

pub fn parser(dsl: &str) -> Result<Scheme, SchemeError> {
    let root: JsonValue = serde_json::from_str(dsl)?;
    let root = root
        .as_object()
        .ok_or_else(|| malformed("scheme", "root must be an object"))?;

    // Raw parse first; type names are resolved once every section is known.
    let mut scheme = Scheme::default();
    for (section, body) in root.iter().filter(|(k, _)| filter_nodes(k)) {
        let body = body
            .as_object()
            .ok_or_else(|| malformed(section, "section must be an object"))?;
        match section.as_str() {
            "enums" => {
                for (name, values) in body.iter().filter(|(k, _)| filter_nodes(k)) {
                    scheme.enums.push(parse_enum(name, values)?);
                }
            }
            "messages" => {
                for (name, fields) in body.iter().filter(|(k, _)| filter_nodes(k)) {
                    let fields = fields
                        .as_object()
                        .ok_or_else(|| malformed(name, "message must be an object"))?;
                    scheme.messages.push(MessageDef {
                        name: name.clone(),
                        fields: parse_fields(name, fields)?,
                    });
                }
            }
            "commands" => {
                for (name, cmd) in body.iter().filter(|(k, _)| filter_nodes(k)) {
                    scheme.commands.push(parse_command(name, cmd)?);
                }
            }
            other => return Err(malformed("scheme", format!("unknown section `{}`", other))),
        }
    }
    scheme.commands.sort_by_key(|c| c.id);

    resolve(&mut scheme)?;
    validate(&scheme)?;
    Ok(scheme)
}

fn filter_nodes(name: &str) -> bool {
    // filter @annotations
    !name.starts_with(ANNOTATION_TOKEN)
}

fn parse_enum(name: &str, values: &JsonValue) -> Result<EnumDef, SchemeError> {
    let list = values
        .as_array()
        .ok_or_else(|| malformed(name, "enum values must be a list"))?;
    let mut out = Vec::with_capacity(list.len());
    for v in list {
        let v = v
            .as_str()
            .ok_or_else(|| malformed(name, "enum values must be strings"))?;
        if v == "UNRECOGNIZED" {
            return Err(malformed(name, "`UNRECOGNIZED` is reserved"));
        }
        out.push(v.to_string());
    }
    if out.is_empty() {
        return Err(malformed(name, "enum needs at least one value"));
    }
    Ok(EnumDef {
        name: name.to_string(),
        values: out,
    })
}

fn parse_command(name: &str, cmd: &JsonValue) -> Result<CommandDef, SchemeError> {
    let cmd = cmd
        .as_object()
        .ok_or_else(|| malformed(name, "command must be an object"))?;
    let id = cmd
        .get(ANNOTATION_ID_STR)
        .and_then(JsonValue::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| malformed(name, "missing or invalid @id"))?;

    let empty = Map::new();
    let args = match cmd.get("args") {
        Some(JsonValue::Object(fields)) => fields,
        None => &empty,
        Some(_) => return Err(malformed(name, "`args` must be an object")),
    };
    let data = match cmd.get("data") {
        Some(JsonValue::Object(fields)) => fields,
        None | Some(JsonValue::Null) => &empty,
        Some(_) => return Err(malformed(name, "`data` must be an object")),
    };

    let args_ctx = format!("{}.args", name);
    let args = parse_fields(&args_ctx, args)?;
    if let Some(f) = args.iter().find(|f| f.number < FIRST_ARGS_FIELD) {
        return Err(malformed(
            &args_ctx,
            format!("`{}` uses reserved number {}", f.json_name, f.number),
        ));
    }
    let data = parse_fields(&format!("{}.data", name), data)?;

    Ok(CommandDef {
        name: name.to_string(),
        id,
        args,
        data: if data.is_empty() { None } else { Some(data) },
    })
}

fn parse_fields(context: &str, fields: &Map<String, JsonValue>) -> Result<Vec<Field>, SchemeError> {
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    for (json_name, spec) in fields.iter().filter(|(k, _)| filter_nodes(k)) {
        let ctx = format!("{}.{}", context, json_name);
        let (number, ty) = match spec {
            JsonValue::String(s) => {
                let (number, ty) = s
                    .split_once(NUMBER_DELIMETR)
                    .ok_or_else(|| malformed(&ctx, "expected `<number>:<type>`"))?;
                let number = number
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| malformed(&ctx, format!("bad field number `{}`", number)))?;
                (number, ty.trim().to_string())
            }
            JsonValue::Object(annotations) => {
                let number = annotations
                    .get(ANNOTATION_NUMBER_STR)
                    .and_then(JsonValue::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| malformed(&ctx, "missing or invalid @number"))?;
                let ty = annotations
                    .get(ANNOTATION_TYPE_STR)
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| malformed(&ctx, "missing @type"))?;
                (number, ty.trim().to_string())
            }
            _ => return Err(malformed(&ctx, "field must be a string or an object")),
        };
        if number == 0 || number > (u32::MAX >> 3) {
            return Err(malformed(&ctx, format!("field number {} out of range", number)));
        }
        if !seen.insert(number) {
            return Err(SchemeError::DuplicateNumber {
                context: context.to_string(),
                number,
            });
        }
        let (repeated, ty) = match ty.strip_prefix(REPEATED_PREFIX) {
            Some(inner) => (true, inner.trim()),
            None => (false, ty.as_str()),
        };
        out.push(Field {
            json_name: json_name.clone(),
            number,
            // named types are provisional until `resolve`
            ty: scalar_convert(ty).map_or_else(|| FieldTy::Message(ty.to_string()), FieldTy::Scalar),
            repeated,
        });
    }
    out.sort_by_key(|f| f.number);
    Ok(out)
}

fn scalar_convert(ty: &str) -> Option<ScalarTy> {
    let ty = match ty {
        "uint32" => ScalarTy::Uint32,
        "uint64" => ScalarTy::Uint64,
        "sint32" => ScalarTy::Sint32,
        "sint64" => ScalarTy::Sint64,
        "bool" => ScalarTy::Bool,
        "double" => ScalarTy::Double,
        "string" => ScalarTy::String,
        "bytes" => ScalarTy::Bytes,
        _ => return None,
    };
    Some(ty)
}

/// Turn provisional named types into timestamp, enum or message references.
fn resolve(scheme: &mut Scheme) -> Result<(), SchemeError> {
    let enums: BTreeSet<String> = scheme.enums.iter().map(|e| e.name.clone()).collect();
    let messages: BTreeSet<String> = scheme.messages.iter().map(|m| m.name.clone()).collect();

    let fix = |context: &str, fields: &mut Vec<Field>| -> Result<(), SchemeError> {
        for f in fields.iter_mut() {
            let name = match &f.ty {
                FieldTy::Message(name) => name.clone(),
                _ => continue,
            };
            f.ty = if name == "timestamp" {
                FieldTy::Timestamp
            } else if enums.contains(&name) {
                FieldTy::Enum(name)
            } else if messages.contains(&name) {
                FieldTy::Message(name)
            } else {
                return Err(SchemeError::UnknownType {
                    context: format!("{}.{}", context, f.json_name),
                    ty: name,
                });
            };
        }
        Ok(())
    };

    for m in &mut scheme.messages {
        fix(&m.name, &mut m.fields)?;
    }
    for c in &mut scheme.commands {
        fix(&format!("{}.args", c.name), &mut c.args)?;
        if let Some(data) = &mut c.data {
            fix(&format!("{}.data", c.name), data)?;
        }
    }
    Ok(())
}

/// Every scheme name ends up as (part of) a Rust identifier.
fn check_ident(context: &str, name: &str) -> Result<(), SchemeError> {
    let mut chars = name.chars();
    let head = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') || UNUSABLE_IDENTS.contains(&name) {
        return Err(SchemeError::BadName {
            context: context.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

fn check_names(scheme: &Scheme) -> Result<(), SchemeError> {
    for e in &scheme.enums {
        check_ident("enums", &e.name)?;
        for v in &e.values {
            check_ident(&e.name, v)?;
        }
    }
    let fields = |context: &str, fields: &[Field]| -> Result<(), SchemeError> {
        for f in fields {
            check_ident(context, &f.json_name)?;
            check_ident(context, &snake_case_name(&f.json_name))?;
        }
        Ok(())
    };
    for m in &scheme.messages {
        check_ident("messages", &m.name)?;
        fields(&m.name, &m.fields)?;
    }
    for c in &scheme.commands {
        check_ident("commands", &c.name)?;
        check_ident("commands", &pascal_case_name(&c.name))?;
        check_ident("commands", &snake_case_name(&c.name))?;
        fields(&format!("{}.args", c.name), &c.args)?;
        if let Some(data) = &c.data {
            fields(&format!("{}.data", c.name), data)?;
        }
    }
    Ok(())
}

fn validate(scheme: &Scheme) -> Result<(), SchemeError> {
    check_names(scheme)?;

    let mut names = BTreeSet::new();
    for name in scheme
        .enums
        .iter()
        .map(|e| &e.name)
        .chain(scheme.messages.iter().map(|m| &m.name))
    {
        if !names.insert(name.as_str()) {
            return Err(SchemeError::Duplicate {
                what: "type",
                name: name.clone(),
            });
        }
    }

    for e in &scheme.enums {
        let mut seen = BTreeSet::new();
        if let Some(dup) = e.values.iter().find(|v| !seen.insert(v.as_str())) {
            return Err(malformed(&e.name, format!("value `{}` listed twice", dup)));
        }
    }

    let mut ids = BTreeSet::new();
    for c in &scheme.commands {
        if !ids.insert(c.id) {
            return Err(SchemeError::Duplicate {
                what: "command id",
                name: c.id.to_string(),
            });
        }
    }

    let all_fields = scheme
        .messages
        .iter()
        .map(|m| (m.name.clone(), &m.fields))
        .chain(scheme.commands.iter().flat_map(|c| {
            std::iter::once((format!("{}.args", c.name), &c.args))
                .chain(c.data.iter().map(move |d| (format!("{}.data", c.name), d)))
        }));
    for (context, fields) in all_fields {
        for f in fields.iter().filter(|f| f.repeated) {
            match f.ty {
                FieldTy::Scalar(ScalarTy::Bytes) | FieldTy::Enum(_) | FieldTy::Timestamp => {
                    return Err(malformed(
                        &format!("{}.{}", context, f.json_name),
                        "repeated bytes, enums and timestamps are not supported",
                    ))
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEME: &str = r#"{
        "@version": 1,
        "enums": { "Mode": ["OFF", "ON"] },
        "messages": {
            "Probe": { "id": "1:uint32", "mode": { "@number": 2, "@type": "Mode" } }
        },
        "commands": {
            "probe": {
                "@id": 7,
                "args": { "offsets": "3:repeated sint32", "at": "4:timestamp" },
                "data": { "probes": "1:repeated Probe" }
            },
            "ping": { "@id": 2, "args": {} }
        }
    }"#;

    #[test]
    fn parses_and_resolves() {
        let scheme = parser(SCHEME).unwrap();
        assert_eq!(scheme.enums[0].values, ["OFF", "ON"]);
        assert_eq!(scheme.messages[0].fields[1].ty, FieldTy::Enum("Mode".into()));

        // sorted by id
        assert_eq!(scheme.commands[0].name, "ping");
        assert!(scheme.commands[0].data.is_none());

        let probe = &scheme.commands[1];
        assert!(probe.args[0].repeated);
        assert_eq!(probe.args[0].ty, FieldTy::Scalar(ScalarTy::Sint32));
        assert_eq!(probe.args[1].ty, FieldTy::Timestamp);
        let data = probe.data.as_ref().unwrap();
        assert_eq!(data[0].ty, FieldTy::Message("Probe".into()));
    }

    fn rejects(dsl: &str) -> SchemeError {
        parser(dsl).unwrap_err()
    }

    #[test]
    fn rejections() {
        assert!(matches!(rejects("[1]"), SchemeError::Malformed { .. }));
        assert!(matches!(rejects("{"), SchemeError::Json(_)));
        assert!(matches!(
            rejects(r#"{"messages": {"A": {"x": "1:uint32", "y": "1:bool"}}}"#),
            SchemeError::DuplicateNumber { number: 1, .. }
        ));
        assert!(matches!(
            rejects(r#"{"messages": {"A": {"x": "1:Nope"}}}"#),
            SchemeError::UnknownType { ref ty, .. } if ty == "Nope"
        ));
        assert!(matches!(
            rejects(r#"{"commands": {"a": {"@id": 1, "args": {"x": "2:bool"}}}}"#),
            SchemeError::Malformed { ref reason, .. } if reason.contains("reserved")
        ));
        assert!(matches!(
            rejects(r#"{"commands": {"a": {"@id": 1}, "b": {"@id": 1}}}"#),
            SchemeError::Duplicate { what: "command id", .. }
        ));
        assert!(matches!(
            rejects(r#"{"messages": {"A": {"x": "1:repeated bytes"}}}"#),
            SchemeError::Malformed { .. }
        ));
        assert!(matches!(
            rejects(r#"{"enums": {"E": ["A", "UNRECOGNIZED"]}}"#),
            SchemeError::Malformed { .. }
        ));
    }

    #[test]
    fn names_must_be_identifiers() {
        for dsl in [
            r#"{"messages": {"A": {"self": "1:uint32"}}}"#,
            r#"{"messages": {"A": {"Self": "1:uint32"}}}"#,
            r#"{"messages": {"A": {"2d": "1:uint32"}}}"#,
            r#"{"messages": {"crate": {"x": "1:uint32"}}}"#,
            r#"{"messages": {"A-B": {"x": "1:uint32"}}}"#,
            r#"{"enums": {"E": ["super"]}}"#,
            r#"{"enums": {"E": ["9LIVES"]}}"#,
            r#"{"commands": {"1shot": {"@id": 1}}}"#,
        ] {
            assert!(
                matches!(rejects(dsl), SchemeError::BadName { .. }),
                "accepted {}",
                dsl
            );
        }
        // plain keywords are fine, they become raw identifiers
        assert!(parser(r#"{"messages": {"A": {"type": "1:uint32", "match": "2:bool"}}}"#).is_ok());
    }
}
