//! `forgeloop config`: print the effective configuration.

use forgeloop_config::AppConfig;

pub fn show(defaults: bool) -> Result<(), Box<dyn std::error::Error>> {
    if defaults {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some("***".into());
    }

    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
