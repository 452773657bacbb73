use std::env;
use std::error::Error;
use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() -> Result<(), Box<dyn Error>> {
    // Obtain scheme path from evar
    let path = match env::var("OBC_SCHEME_PATH") {
        Ok(path) => PathBuf::from(path),
        Err(_) => PathBuf::from("../scheme.json"),
    };

    let txt = read_to_string(&path)
        .map_err(|e| format!("cannot read scheme {}: {}", path.display(), e))?;
    let txt = obcwire_codegen::generate(&txt)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    let out = Path::new(&env::var("OUT_DIR")?).join("codegen.rs");
    write(&out, txt)?;

    // best effort
    let _ = Command::new("rustfmt").arg(&out).output();

    println!("cargo:rerun-if-changed={}", path.display());
    println!("cargo:rerun-if-env-changed=OBC_SCHEME_PATH");
    Ok(())
}
