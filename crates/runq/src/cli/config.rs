use anyhow::Result;
use clap::Parser;

/// Print the effective configuration.
#[derive(Parser)]
pub struct ConfigCommand {
    /// Configuration file path. Defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<String>,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        let config = super::load_config(self.config.as_deref())?;
        print!("{}", toml::to_string_pretty(&config)?);
        Ok(())
    }
}
