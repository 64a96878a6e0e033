use anyhow::Result;
use clap::{Parser, Subcommand};
use laminar_cli::commands;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "laminar")]
#[command(about = "Laminar - Declarative binary layouts", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the field table of each schema
    Describe {
        /// Schema description file (JSON)
        #[arg(short, long)]
        schemas: String,

        /// Only describe this schema
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Decode bytes and print them as JSON
    Decode {
        /// Schema description file (JSON)
        #[arg(long)]
        schemas: String,

        /// Schema to decode (the header, with --message)
        #[arg(short, long)]
        schema: String,

        /// Additional schemas to decode after the opcode chain
        #[arg(short, long)]
        extra: Vec<String>,

        /// Input file, or - for stdin
        #[arg(short, long)]
        input: String,

        /// Input is hex text
        #[arg(long)]
        hex: bool,

        /// Decode a layered message, following opcodes
        #[arg(short, long)]
        message: bool,
    },

    /// Encode an instance built from JSON values
    Encode {
        /// Schema description file (JSON)
        #[arg(long)]
        schemas: String,

        /// Schema to instantiate
        #[arg(short, long)]
        schema: String,

        /// Field values as a JSON object, or @file
        #[arg(long, default_value = "{}")]
        values: String,

        /// Output file for the encoded bytes
        #[arg(short, long)]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Describe { schemas, name } => {
            commands::describe::execute(&schemas, name.as_deref())
        }

        Commands::Decode {
            schemas,
            schema,
            extra,
            input,
            hex,
            message,
        } => commands::decode::execute(&schemas, &schema, &extra, &input, hex, message),

        Commands::Encode {
            schemas,
            schema,
            values,
            output,
        } => commands::encode::execute(&schemas, &schema, &values, &output),
    }
}
