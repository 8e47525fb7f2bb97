use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tinyrpc::{compress, decompress, Client};

#[derive(Parser)]
#[command(name = "tinyrpc-cli")]
#[command(about = "Call procedures on a tinyrpc service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a procedure and print the response body
    Call {
        /// Service descriptor file (JSON or TOML)
        descriptor: PathBuf,
        /// Procedure name
        procedure: String,
        /// Request body; switches the method to POST
        #[arg(short, long)]
        data: Option<String>,
        /// Ask for a gzip+base64 response and decode it
        #[arg(long)]
        gzip: bool,
        /// Extra header as key=value (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// List the procedures a descriptor advertises
    Procedures {
        descriptor: PathBuf,
    },
    /// Compress text to gzip+base64
    Compress { text: String },
    /// Decode gzip+base64 back to text
    Decompress { text: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Call {
            descriptor,
            procedure,
            data,
            gzip,
            headers,
        } => {
            let mut pairs: Vec<(String, String)> = Vec::new();
            for header in &headers {
                let (k, v) = header
                    .split_once('=')
                    .ok_or_else(|| format!("header '{}' is not key=value", header))?;
                pairs.push((k.trim().to_string(), v.trim().to_string()));
            }
            if gzip {
                pairs.push(("accept".into(), "gzip".into()));
            }
            let borrowed: Vec<(&str, &str)> =
                pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

            let client = Client::connect(descriptor).await?;
            let result = client.procedure(&procedure, data.as_deref(), &borrowed).await;
            client.close();
            let ctx = result?;

            if let Some(status) = ctx.response.headers.status.filter(|s| *s != 200) {
                eprintln!("status {}", status);
            }
            if gzip {
                println!("{}", decompress(&ctx.response.body)?);
            } else {
                println!("{}", ctx.response.body);
            }
        }
        Commands::Procedures { descriptor } => {
            let service = tinyrpc::DescriptorSource::from(descriptor).resolve()?;
            println!("{} {} ({}:{})", service.name, service.version, service.endpoint, service.port);
            for name in service.procedures {
                println!("  {}", name);
            }
        }
        Commands::Compress { text } => println!("{}", compress(&text)?),
        Commands::Decompress { text } => println!("{}", decompress(&text)?),
    }

    Ok(())
}
