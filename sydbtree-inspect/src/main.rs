use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use clap::Subcommand;
use serde_json::Value;
use sydbtree::btree::{FileParameter, OpenParameter};
use sydbtree::parameter::{ParameterKey, ParameterValue, Parameters};
use sydbtree::FileIdFile;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// FileID file location
    fileid: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan a layout from a JSON FileID description and persist it (overwrites)
    Create {
        /// JSON object of parameter names to values
        #[arg(short, long)]
        spec: PathBuf,
    },
    /// Display the derived layout
    Show,
    /// Plan the layout again from the persisted FileID and check nothing changes
    Verify,
    /// Validate a JSON open option description against the file
    Open {
        /// JSON object of parameter names to values
        #[arg(short, long)]
        options: PathBuf,
    },
}

// A JSON object such as `{"FieldNumber": 2, "FieldType[0]": 10, "Mounted": true}`
fn read_parameters(path: &Path) -> Result<Parameters> {
    let text = std::fs::read_to_string(path)?;
    let Value::Object(map) = serde_json::from_str::<Value>(&text)? else {
        bail!("{}: expected a JSON object", path.display());
    };
    let mut parameters = Parameters::new();
    for (name, value) in map {
        let key = ParameterKey::from_str(&name)?;
        let value = match value {
            Value::Bool(b) => ParameterValue::Boolean(b),
            Value::Number(n) => n
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(ParameterValue::Integer)
                .ok_or_else(|| anyhow!("{name}: {n} is not a 32 bit integer"))?,
            Value::String(s) => ParameterValue::String(s),
            other => bail!("{name}: unsupported value {other}"),
        };
        parameters.set(key, value);
    }
    Ok(parameters)
}

async fn load(path: &Path) -> Result<FileParameter> {
    let mut id_file = FileIdFile::try_open(path).await?;
    let file_id = id_file.read().await?;
    Ok(FileParameter::try_new(&file_id)?)
}

async fn process_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Create { spec } => {
            let file = FileParameter::try_new(&read_parameters(spec)?)?;
            let id_file = FileIdFile::try_new(&cli.fileid, file.file_id()).await?;
            id_file.flush().await?;
            println!(
                "created {}: page size {}, {} keys per node",
                cli.fileid.display(),
                file.page_size(),
                file.key_per_node()
            );
        }
        Command::Show => {
            let file = load(&cli.fileid).await?;
            println!("{}", serde_json::to_string_pretty(&file.layout())?);
            for (key, value) in file.file_id().iter() {
                println!("{key} = {value}");
            }
        }
        Command::Verify => {
            let mut id_file = FileIdFile::try_open(&cli.fileid).await?;
            let stored = id_file.read().await?;
            let file = FileParameter::try_new(&stored)?;
            if file.file_id() != &stored {
                bail!("{}: FileID is not normalized", cli.fileid.display());
            }
            let again = FileParameter::try_new(file.file_id())?;
            if again.layout() != file.layout() {
                bail!("{}: layout is not reproducible", cli.fileid.display());
            }
            println!("{}: ok", cli.fileid.display());
        }
        Command::Open { options } => {
            let file = load(&cli.fileid).await?;
            let parameter = OpenParameter::try_new(&file, &read_parameters(options)?)?;
            println!("{}", serde_json::to_string_pretty(&parameter)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = match env::var("TMPDIR") {
        Ok(d) => d,
        Err(_e) => ".".to_string(),
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "sydbtree-inspect.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt().with_writer(non_blocking).init();

    tracing::info!("sydbtree-inspect {:?}", cli.command);
    process_command(&cli).await
}
