//! Generates message types, the command catalog, a typed client and a
//! service/dispatcher pair from a `scheme.json` description.

pub mod parser;
mod gen;

pub use gen::{pascal_case_name, snake_case_name};
pub use parser::SchemeError;

/// Rust source for the protocol described by `dsl`.
pub fn generate(dsl: &str) -> Result<String, SchemeError> {
    let scheme = parser::parser(dsl)?;
    Ok(gen::gen(&scheme))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs::read_to_string;

    fn parses(src: &str) -> syn::File {
        match syn::parse_file(src) {
            Ok(file) => file,
            Err(e) => panic!("generated code does not parse: {}\n{}", e, src),
        }
    }

    fn item_names(file: &syn::File) -> Vec<String> {
        file.items
            .iter()
            .filter_map(|item| match item {
                syn::Item::Struct(s) => Some(s.ident.to_string()),
                syn::Item::Enum(e) => Some(e.ident.to_string()),
                syn::Item::Type(t) => Some(t.ident.to_string()),
                syn::Item::Trait(t) => Some(t.ident.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn small_scheme_generates_every_item() {
        let src = generate(
            r#"{
                "enums": { "Mode": ["OFF", "ON"] },
                "messages": { "Probe": { "id": "1:uint32", "type": "2:Mode" } },
                "commands": {
                    "ping": { "@id": 2 },
                    "readProbes": {
                        "@id": 9,
                        "args": { "limit": "3:uint32" },
                        "data": { "probes": "1:repeated Probe", "at": "2:timestamp" }
                    }
                }
            }"#,
        )
        .unwrap();
        let file = parses(&src);
        let names = item_names(&file);
        for expected in [
            "Mode",
            "Probe",
            "PingCommandArgs",
            "PingCommandResponse",
            "PingCommand",
            "ReadProbesCommandArgs",
            "ReadProbesResponseData",
            "ReadProbesCommandResponse",
            "ReadProbesCommand",
            "ObcClient",
            "ObcService",
            "ObcServer",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
        assert!(!names.iter().any(|n| n == "PingResponseData"));
        assert!(src.contains("r#type"));
    }

    #[test]
    fn bad_scheme_is_an_error() {
        assert!(generate(r#"{"messages": {"A": {"x": "1:float"}}}"#).is_err());
    }

    #[test]
    fn repository_scheme_generates() {
        let txt = read_to_string("../scheme.json").unwrap();
        let src = generate(&txt).unwrap();
        let names = item_names(&parses(&src));
        assert!(names.iter().any(|n| n == "GpsStatusResponseData"));
    }
}
