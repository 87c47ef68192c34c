/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Command line front end: parse, typecheck, pack and pretty-print Michelson.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser as ClapParser, Subcommand};
use michelson_toolchain::ast::Micheline;
use michelson_toolchain::context::Ctx;
use michelson_toolchain::emitter::{emit_micheline, emit_with_provenance, FormatOptions};
use michelson_toolchain::parser::{Parser, ParserOptions};
use michelson_toolchain::protocol::Protocol;
use michelson_toolchain::serializer::{pack_data, script_expr_hash, unpack_data};
use michelson_toolchain::typechecker::{typecheck_data, typecheck_script};
use tracing::{debug, error, subscriber::set_global_default};
use tracing_subscriber::filter::EnvFilter;

#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Protocol whose rules apply, e.g. `nairobi`
    #[arg(short, long, global = true, default_value_t = Protocol::LATEST)]
    protocol: Protocol,
    /// Logging level used when RUST_LOG is not set
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and print the expanded expression
    Parse {
        #[command(flatten)]
        input: Input,
        /// Print the protocol JSON representation instead of text
        #[arg(long)]
        json: bool,
    },
    /// Typecheck a contract, or data against `--type`
    Typecheck {
        #[command(flatten)]
        input: Input,
        /// Type of the data; without it the input is a contract
        #[arg(short = 't', long = "type")]
        ty: Option<String>,
    },
    /// Pack data, printing the hex encoding and its expression hash
    Pack {
        #[command(flatten)]
        input: Input,
        #[arg(short = 't', long = "type")]
        ty: Option<String>,
    },
    /// Unpack hex-encoded bytes
    Unpack {
        /// Hex-encoded packed data, with or without `0x`
        hex: String,
        #[arg(short = 't', long = "type")]
        ty: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Pretty-print an expression
    Emit {
        #[command(flatten)]
        input: Input,
        /// Indentation width; 0 prints on a single line
        #[arg(long, default_value_t = 2)]
        indent: usize,
        /// Print macros and global constants as written. The input must be a
        /// single expression.
        #[arg(long)]
        fold_macros: bool,
    },
}

#[derive(Args)]
struct Input {
    /// Source file, `-` for stdin
    path: PathBuf,
    /// Read the input as protocol JSON
    #[arg(long = "from-json")]
    from_json: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read {0}: {1}")]
    Io(String, std::io::Error),
    #[error("empty input")]
    EmptyInput,
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Parser(#[from] michelson_toolchain::parser::ParserError),
    #[error(transparent)]
    Typechecker(#[from] michelson_toolchain::typechecker::TcError),
    #[error(transparent)]
    Pack(#[from] michelson_toolchain::serializer::PackError),
}

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    if set_global_default(subscriber).is_err() {
        eprintln!("could not install the log subscriber");
    }
}

fn read_source(path: &Path) -> Result<String, CliError> {
    let io_err = |e| CliError::Io(path.display().to_string(), e);
    let mut src = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin()
            .read_to_string(&mut src)
            .map_err(io_err)?;
    } else {
        src = std::fs::read_to_string(path).map_err(io_err)?;
    }
    Ok(src)
}

/// Parse the input as a script: several top-level expressions are read as a
/// sequence.
fn load<'a>(parser: &'a Parser<'a>, input: &Input) -> Result<Micheline<'a>, CliError> {
    let src = read_source(&input.path)?;
    if input.from_json {
        let value: serde_json::Value = serde_json::from_str(&src)?;
        return Ok(parser.parse_json(&value)?);
    }
    parser.parse_script(&src)?.ok_or(CliError::EmptyInput)
}

fn parse_type<'a>(
    parser: &'a Parser<'a>,
    ty: &Option<String>,
) -> Result<Option<Micheline<'a>>, CliError> {
    ty.as_deref()
        .map(|t| parser.parse(t))
        .transpose()
        .map_err(CliError::from)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let parser = Parser::with_options(ParserOptions {
        protocol: cli.protocol,
        ..ParserOptions::default()
    });
    let ctx = Ctx::new(cli.protocol);
    match cli.command {
        Commands::Parse { input, json } => {
            let expr = load(&parser, &input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&expr.to_json())?);
            } else {
                println!("{}", emit_micheline(&expr, &FormatOptions::default()));
            }
        }
        Commands::Typecheck { input, ty } => {
            let expr = load(&parser, &input)?;
            match parse_type(&parser, &ty)? {
                Some(ty) => {
                    let ty = typecheck_data(&expr, &ty, &ctx)?;
                    println!("well typed: {ty}");
                }
                None => {
                    let script = typecheck_script(&expr, &ctx)?;
                    println!("parameter: {}", script.parameter);
                    println!("storage: {}", script.storage);
                    for (ep, ty) in script.entrypoints.iter() {
                        println!("entrypoint %{ep}: {ty}");
                    }
                    for view in &script.views {
                        println!("view \"{}\": {} -> {}", view.name, view.input, view.output);
                    }
                    println!("code: {}", script.code_result);
                }
            }
        }
        Commands::Pack { input, ty } => {
            let expr = load(&parser, &input)?;
            let ty = parse_type(&parser, &ty)?;
            if let Some(ty) = &ty {
                typecheck_data(&expr, ty, &ctx)?;
            }
            let packed = pack_data(&expr, ty.as_ref())?;
            println!("0x{}", hex::encode(&packed));
            println!("{}", script_expr_hash(&packed));
        }
        Commands::Unpack { hex, ty, json } => {
            let bytes = hex::decode(hex.trim().trim_start_matches("0x"))?;
            let ty = parse_type(&parser, &ty)?;
            let expr = unpack_data(&parser.arena, &bytes, ty.as_ref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&expr.to_json())?);
            } else {
                println!("{}", emit_micheline(&expr, &FormatOptions::default()));
            }
        }
        Commands::Emit {
            input,
            indent,
            fold_macros,
        } => {
            let mut options = if indent == 0 {
                FormatOptions::default()
            } else {
                FormatOptions::indented(indent)
            };
            if fold_macros && !input.from_json {
                options.fold_macros = true;
                let src = read_source(&input.path)?;
                let (expr, provenance) = parser.parse_with_provenance(&src)?;
                println!("{}", emit_with_provenance(expr, &provenance, &options));
            } else {
                let expr = load(&parser, &input)?;
                println!("{}", emit_micheline(&expr, &options));
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    debug!(protocol = %cli.protocol, "starting");
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
