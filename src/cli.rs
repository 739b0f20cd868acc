//! Command-line front end: list and call the externs of a manifest

use crate::config::RuntimeConfig;
use crate::manifest::Manifest;
use crate::value::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, PartialEq)]
enum Command {
    List,
    Call { name: String, args: Vec<String> },
}

#[derive(Debug, PartialEq)]
struct Options {
    config: Option<PathBuf>,
    manifest: PathBuf,
    command: Command,
}

impl Options {
    fn from_args(args: &[String]) -> Result<Self, String> {
        let prog = args.first().map(String::as_str).unwrap_or("pych");
        let mut config = None;
        let mut positional = Vec::new();

        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            // Everything after `call <name>` is passed through as arguments
            if positional.len() >= 3 {
                positional.push(arg.clone());
                continue;
            }
            match arg.as_str() {
                "--help" | "-h" => return Err(usage(prog)),
                "--config" => {
                    let path = iter.next().ok_or_else(|| "--config requires a path".to_string())?;
                    config = Some(PathBuf::from(path));
                }
                opt if opt.starts_with("--") => {
                    return Err(format!("Unknown option: {}\n\n{}", opt, usage(prog)))
                }
                _ => positional.push(arg.clone()),
            }
        }

        let mut positional = positional.into_iter();
        let manifest = positional.next().map(PathBuf::from).ok_or_else(|| usage(prog))?;
        let command = match positional.next().as_deref() {
            Some("list") | None => Command::List,
            Some("call") => Command::Call {
                name: positional.next().ok_or("call requires an extern name")?,
                args: positional.collect(),
            },
            Some(other) => return Err(format!("Unknown command: {}\n\n{}", other, usage(prog))),
        };

        Ok(Self {
            config,
            manifest,
            command,
        })
    }
}

fn usage(prog: &str) -> String {
    format!(
        "pych - call C and Chapel functions declared in a manifest\n\n\
        USAGE:\n    {} [OPTIONS] <manifest> [list]\n    \
        {} [OPTIONS] <manifest> call <name> [args...]\n\n\
        OPTIONS:\n    \
        -h, --help        Print help information\n    \
        --config <file>   Runtime config (default: discover pych.toml)\n\n\
        ENVIRONMENT:\n    \
        PYCH_LIBRARY_PATH  Extra library directories\n    \
        PYCH_LOG_LEVEL     trace, debug, info, warn, error",
        prog, prog
    )
}

/// Entry point for the `pych` binary
pub fn cli_main() -> Result<(), Box<dyn std::error::Error>> {
    crate::logging::init();

    let args: Vec<String> = std::env::args().collect();
    let options = Options::from_args(&args)?;

    let config = match &options.config {
        Some(path) => RuntimeConfig::load(path)?.with_env(),
        None => RuntimeConfig::from_env(),
    };
    tracing::debug!(search_paths = ?config.search_paths, "Runtime configured");

    let preload = config.preload;
    let runtime = Arc::new(crate::DylibRuntime::new(config));
    let manifest = Manifest::load(&options.manifest)?;
    let table = manifest.bind(runtime.clone())?;
    if preload {
        runtime.preload_hinted();
    }

    match options.command {
        Command::List => {
            for call in table.iter() {
                let desc = call.descriptor();
                println!(
                    "{}  [{} in {}]",
                    desc.signature(),
                    desc.external_symbol_name,
                    desc.library_name.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Call { name, args } => {
            let call = table
                .get(&name)
                .ok_or_else(|| format!("No extern named '{}' in {}", name, options.manifest.display()))?;
            let types = &call.descriptor().argument_types;
            if args.len() != types.len() {
                return Err(format!(
                    "{} expects {} arguments, got {}",
                    call.descriptor().signature(),
                    types.len(),
                    args.len()
                )
                .into());
            }

            let values = types
                .iter()
                .zip(&args)
                .map(|(ty, text)| Value::parse(*ty, text))
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", call.call(&values)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_list() {
        let options = Options::from_args(&args(&["pych", "externs.toml"])).unwrap();
        assert_eq!(options.manifest, PathBuf::from("externs.toml"));
        assert_eq!(options.command, Command::List);
        assert_eq!(options.config, None);
    }

    #[test]
    fn test_parse_call() {
        let options = Options::from_args(&args(&[
            "pych", "--config", "pych.toml", "externs.toml", "call", "add", "2", "--3",
        ]))
        .unwrap();
        assert_eq!(options.config, Some(PathBuf::from("pych.toml")));
        assert_eq!(
            options.command,
            Command::Call { name: "add".into(), args: vec!["2".into(), "--3".into()] }
        );
    }

    #[test]
    fn test_options_after_call_name_pass_through() {
        let options = Options::from_args(&args(&[
            "pych", "externs.toml", "call", "greet", "--config", "--help",
        ]))
        .unwrap();
        assert_eq!(options.config, None);
        assert_eq!(
            options.command,
            Command::Call { name: "greet".into(), args: vec!["--config".into(), "--help".into()] }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Options::from_args(&args(&["pych"])).is_err());
        assert!(Options::from_args(&args(&["pych", "--verbose", "m.toml"])).is_err());
        assert!(Options::from_args(&args(&["pych", "m.toml", "call"])).is_err());
        assert!(Options::from_args(&args(&["pych", "m.toml", "run"])).is_err());
        assert!(Options::from_args(&args(&["pych", "--config"])).is_err());
    }
}
