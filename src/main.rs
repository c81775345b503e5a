//! nativecall - call an exported native function from the command line
//!
//! ```text
//! nativecall libc.so.6 strlen hello --ret usize
//! nativecall user32 GetSystemMetrics 80 --ret i32
//! nativecall libc.so.6 fflush null --ret discard
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use nativecall::{Dispatcher, DispatcherConfig, Kind, ReturnSpec, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nativecall")]
#[command(version)]
#[command(about = "Call an exported function of a shared library", long_about = None)]
struct Cli {
    /// Library name or path (e.g. libc.so.6, kernel32)
    library: String,

    /// Exported symbol to call
    symbol: String,

    /// Arguments: null, integers, floats, kind:value (e.g. u8:7, ptr:0x10), or text
    #[arg(allow_negative_numbers = true)]
    args: Vec<String>,

    /// Return kind (i32, u64, ptr, cstr, ...) or "discard"
    #[arg(short, long)]
    ret: Option<String>,

    /// Configuration file (default: nearest nativecall.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => DispatcherConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            DispatcherConfig::find_and_load(&cwd).context("Failed to load nativecall.toml")?
        }
    };

    let ret = parse_return(cli.ret.as_deref())?;
    let args = cli
        .args
        .iter()
        .map(|a| parse_arg(a))
        .collect::<Result<Vec<_>>>()?;

    // Safety: the user asked for this library and call shape explicitly
    let dispatcher = unsafe { Dispatcher::open_with_config(&cli.library, &config) }?;
    let result = unsafe { dispatcher.call(&cli.symbol, &args, ret) }?;

    match result {
        Some(Value::Str(s)) => println!("{}", s),
        Some(value) => println!("{}", value),
        None => {}
    }

    dispatcher.close()?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_return(ret: Option<&str>) -> Result<ReturnSpec> {
    match ret {
        None => Ok(ReturnSpec::Untyped),
        Some("discard") | Some("_") => Ok(ReturnSpec::Discarded),
        Some(name) => Kind::parse(name)
            .map(ReturnSpec::Typed)
            .ok_or_else(|| anyhow!("Unknown return kind: {}", name)),
    }
}

fn parse_arg(arg: &str) -> Result<Value> {
    if arg == "null" {
        return Ok(Value::Null);
    }

    if let Some((prefix, rest)) = arg.split_once(':') {
        if let Some(kind) = Kind::parse(prefix) {
            return parse_typed(kind, rest)
                .with_context(|| format!("Invalid {} argument: {}", kind, rest));
        }
    }

    if let Ok(v) = arg.parse::<i32>() {
        return Ok(Value::I32(v));
    }
    if let Ok(v) = arg.parse::<i64>() {
        return Ok(Value::I64(v));
    }
    if let Ok(v) = arg.parse::<f64>() {
        return Ok(Value::F64(v));
    }
    Ok(Value::Str(arg.to_string()))
}

fn parse_typed(kind: Kind, text: &str) -> Result<Value> {
    let value = match kind {
        Kind::Bool => Value::Bool(parse_bool(text)?),
        Kind::I8 => Value::I8(text.parse()?),
        Kind::U8 => Value::U8(u8::try_from(parse_unsigned(text)?)?),
        Kind::I16 => Value::I16(text.parse()?),
        Kind::U16 => Value::U16(u16::try_from(parse_unsigned(text)?)?),
        Kind::I32 => Value::I32(text.parse()?),
        Kind::U32 => Value::U32(u32::try_from(parse_unsigned(text)?)?),
        Kind::I64 => Value::I64(text.parse()?),
        Kind::U64 => Value::U64(parse_unsigned(text)?),
        Kind::Isize => Value::Isize(text.parse()?),
        Kind::Usize => Value::Usize(usize::try_from(parse_unsigned(text)?)?),
        Kind::F32 => Value::F32(text.parse()?),
        Kind::F64 => Value::F64(text.parse()?),
        Kind::Ptr => Value::Pointer(usize::try_from(parse_unsigned(text)?)?),
        Kind::CStr => Value::Str(text.to_string()),
        Kind::Bytes => Value::Bytes(text.as_bytes().to_vec()),
        Kind::Void => bail!("void is not an argument kind"),
    };
    Ok(value)
}

fn parse_bool(text: &str) -> Result<bool> {
    match text.to_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => bail!("expected true, false, 1 or 0"),
    }
}

/// Decimal or 0x-prefixed hexadecimal
fn parse_unsigned(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => text.parse()?,
    };
    Ok(parsed)
}
