use std::env;

/// Loads `<FILE_NAME>.<ENV>.toml`, `ENV` defaulting to `dev`.
pub fn get_config_from_env<'a, T: 'a>() -> Result<T, config::ConfigError>
where
    T: serde::Deserialize<'a>,
{
    let environment: String = env::var("ENV").unwrap_or_else(|_| "dev".into());
    let file_name = env::var("FILE_NAME")
        .map_err(|_| config::ConfigError::NotFound("FILE_NAME environment variable".to_string()))?;

    get_config_from_file(&format!("{}.{}.toml", file_name, environment))
}

pub fn get_config_from_file<'a, T: 'a>(file_path: &str) -> Result<T, config::ConfigError>
where
    T: serde::Deserialize<'a>,
{
    let mut configuration = config::Config::default();
    configuration.merge(config::File::with_name(file_path))?;
    configuration.try_into()
}
