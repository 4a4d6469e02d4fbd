mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    ClientSettings, LogSettings, PartialSettings, RelaySettings, ServerSettings, Settings,
};

/// Environment prefix; nested keys use `__`, e.g. `JOBRELAY_CLIENT__URL`.
pub const ENV_PREFIX: &str = "JOBRELAY";

/// Load settings from `config/default.{toml,json,...}` (optional) and then
/// the environment, after reading a `.env` file if one exists. Anything
/// left unset falls back to `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

    let partial: PartialSettings = builder.build()?.try_deserialize()?;
    Ok(Settings::merged(partial))
}
