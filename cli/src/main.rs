use std::fs;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};

use obc_catalog::{command_codecs, CATALOG};
use obcwire::{transcode, CallError, CodecConfig, Int64Policy, MessageCodec, Side};

#[derive(Debug, Parser)]
#[command(name = "obcwire-cli", about = "Inspect and transcode OBC command payloads")]
struct Cli {
    /// Codec settings as JSON, e.g. `{"int64": "native"}`
    #[arg(long, global = true, env = "OBCWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Accept 64-bit integers above 2^53-1
    #[arg(long, global = true)]
    native_int64: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print every command in the catalog
    List,
    /// Print the field table of a command's args or response
    Describe(Target),
    /// JSON -> hex encoded protobuf
    Encode {
        #[command(flatten)]
        target: Target,
        /// JSON text, or `-` for stdin
        input: String,
    },
    /// Hex encoded protobuf -> JSON
    Decode {
        #[command(flatten)]
        target: Target,
        /// Hex text, or `-` for stdin
        input: String,
    },
    /// Read `encode|decode <cmd> [--response] <payload>` lines from stdin
    Shell,
}

#[derive(Debug, Args)]
struct Target {
    /// Command name as listed by `list`
    command: String,
    /// Use the response message instead of the args
    #[arg(long)]
    response: bool,
}

impl Target {
    fn side(&self) -> Side {
        if self.response {
            Side::Response
        } else {
            Side::Args
        }
    }

    fn codec(&self) -> Result<MessageCodec> {
        let codecs = command_codecs(&self.command)
            .ok_or_else(|| CallError::UnknownCommand(self.command.clone()))
            .context("try `list`")?;
        Ok(*codecs.side(self.side()))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    debug!("codec config: {:?}", config);

    match cli.command {
        Cmd::List => list(),
        Cmd::Describe(target) => {
            let codec = target.codec()?;
            let desc = transcode::describe(&(codec.descriptor)());
            println!("{}", serde_json::to_string_pretty(&desc)?);
        }
        Cmd::Encode { target, input } => println!("{}", encode(&target, &read_input(&input)?, &config)?),
        Cmd::Decode { target, input } => println!("{}", decode(&target, &read_input(&input)?, &config)?),
        Cmd::Shell => shell(&config)?,
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<CodecConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let txt = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&txt).with_context(|| format!("parsing {}", path.display()))?
        }
        None => CodecConfig::default(),
    };
    if cli.native_int64 {
        config.int64 = Int64Policy::Native;
    }
    Ok(config)
}

fn read_input(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_owned());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf).context("reading stdin")?;
    Ok(buf)
}

fn list() {
    println!("{:>4}  {:<18} {:<28} response", "id", "command", "args");
    for cmd in CATALOG.commands() {
        println!(
            "{:>4}  {:<18} {:<28} {}",
            cmd.id, cmd.name, cmd.request_type, cmd.response_type
        );
    }
}

fn encode(target: &Target, json: &str, config: &CodecConfig) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(json.trim()).context("input is not JSON")?;
    let codec = target.codec()?;
    let bytes = (codec.json_to_wire)(&value, config)
        .with_context(|| format!("encoding {}", codec.name()))?;
    info!("{} {}: {} bytes", target.command, target.side(), bytes.len());
    Ok(hex::encode(bytes))
}

fn decode(target: &Target, txt: &str, config: &CodecConfig) -> Result<String> {
    let compact: String = txt.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&compact).context("input is not hex")?;
    let codec = target.codec()?;
    let value = (codec.wire_to_json)(&bytes, config)
        .with_context(|| format!("decoding {}", codec.name()))?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// One shell line: `encode|decode <cmd> [--response] <payload>`.
fn interpret(line: &str, config: &CodecConfig) -> Result<String> {
    let (verb, rest) = split_word(line);
    let (command, mut rest) = split_word(rest);
    if command.is_empty() {
        bail!("usage: encode|decode <cmd> [--response] <payload>");
    }
    let mut response = false;
    if let Some(tail) = rest.strip_prefix("--response") {
        response = true;
        rest = tail.trim_start();
    }
    let target = Target {
        command: command.to_owned(),
        response,
    };
    match verb {
        "encode" => encode(&target, rest, config),
        "decode" => decode(&target, rest, config),
        other => bail!("unknown verb `{}`", other),
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}

fn shell(config: &CodecConfig) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match interpret(&line, config) {
            Ok(out) => println!("{}", out),
            Err(e) => println!("error: {:#}", e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::parse_from(["obcwire-cli", "--native-int64", "decode", "ping", "--response", "-"]);
        assert!(cli.native_int64);
        match cli.command {
            Cmd::Decode { target, input } => {
                assert_eq!(target.command, "ping");
                assert_eq!(target.side(), Side::Response);
                assert_eq!(input, "-");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn shell_lines_round_trip() {
        let cfg = CodecConfig::default();
        let hex = interpret(
            r#"encode ping {"timeout": 5000, "dateTime": "2024-01-01T00:00:00Z"}"#,
            &cfg,
        )
        .unwrap();
        assert_eq!(hex, "0888271206088081c8ac06");

        let json = interpret(&format!("decode ping {}", hex), &cfg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["timeout"], 5000);
        assert_eq!(value["dateTime"], "2024-01-01T00:00:00.000Z");

        let json = interpret("decode getUptime --response 10 05 32 02 08 2a", &cfg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!({ "cmdId": 5, "data": { "uptimeSeconds": 42 } }));
    }

    #[test]
    fn shell_reports_bad_lines() {
        let cfg = CodecConfig::default();
        assert!(interpret("encode", &cfg).is_err());
        assert!(interpret("frobnicate ping {}", &cfg).is_err());
        assert!(interpret("encode selfDestruct {}", &cfg).is_err());
        assert!(interpret("decode ping zz", &cfg).is_err());
    }

    #[test]
    fn split_word_trims() {
        assert_eq!(split_word("  encode  ping {}"), ("encode", "ping {}"));
        assert_eq!(split_word("list"), ("list", ""));
    }
}
