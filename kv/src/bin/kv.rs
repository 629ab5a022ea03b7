use std::path::Path;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Inspect a file-backed string store", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    db_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Set { key: String, value: String },
    Unset { key: String },
    Get { key: String },
    /// Remove every entry
    Clear,
    /// Print the number of live entries
    Len,
}

fn main() -> Result<(), kv::Error> {
    let cli = Cli::parse();

    let store = kv::Store::<String>::open(Path::new(&format!("{}.db", cli.db_name)))
        .map_err(|e| kv::Error::Read(e.to_string()))?;

    match cli.command {
        Command::Set { key, value } => store.set(&key, &value)?,
        Command::Unset { key } => store.unset(&key)?,
        Command::Get { key } => {
            let value = store.get(&key)?;
            println!("{}", value.unwrap_or_default());
        }
        Command::Clear => store.clear()?,
        Command::Len => println!("{}", store.len()?),
    }

    Ok(())
}
