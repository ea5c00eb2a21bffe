use anyhow::Result;
use clap_serde_derive::ClapSerde;
use serde::Deserialize;

#[derive(ClapSerde, Deserialize, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[arg(short, long, env, default_value = "0.0.0.0")]
    pub address: String,

    /// The port the listener binds to
    #[arg(short, long, env, default_value = "5000")]
    pub port: u16,

    /// The Hugging Face repository holding the summarization model
    #[arg(short, long, env, default_value = "t5-small")]
    pub model_id: String,

    /// The revision of the model repository
    #[arg(long, env, default_value = "main")]
    pub model_revision: String,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&str)?;
        Ok(config)
    }
}
