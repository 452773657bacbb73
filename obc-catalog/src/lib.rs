//! OBC telecommands generated from `scheme.json`.

include!(concat!(env!("OUT_DIR"), "/codegen.rs"));
