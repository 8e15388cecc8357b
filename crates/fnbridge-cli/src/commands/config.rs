use fnbridge_core::BridgeConfig;

pub fn show(config: &BridgeConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
