//! Fns to read variables from the environment more conveniently, and the config every command
//! shares.

use std::env;

use lazy_static::lazy_static;
use tracing::debug;

lazy_static! {
    pub static ref ENV_CONFIG: EnvConfig = get_env_config();
}

/// Get an environment variable, encoding found or missing as Option, and panic otherwise.
pub fn get_env_var(key: &str) -> Option<String> {
    let var = match env::var(key) {
        Err(env::VarError::NotPresent) => None,
        Err(e) => panic!("{e}"),
        Ok(var) => Some(var),
    };

    if let Some(ref existing_var) = var {
        debug!("env var {key}: {existing_var}");
    } else {
        debug!("env var {key} requested but not found")
    };

    var
}

pub fn get_env_bool(key: &str) -> Option<bool> {
    get_env_var(key).map(|var| match var.to_lowercase().as_str() {
        "true" => true,
        "false" => false,
        "t" => true,
        "f" => false,
        "1" => true,
        "0" => false,
        str => panic!("invalid bool value {str} for {key}"),
    })
}

pub fn get_env_u64(key: &str) -> Option<u64> {
    get_env_var(key).map(|var| {
        var.parse::<u64>()
            .unwrap_or_else(|_| panic!("invalid integer value {var} for {key}"))
    })
}

pub struct EnvConfig {
    pub coins_api_url: String,
    pub defi_llama_api_url: String,
    pub log_json: bool,
    pub log_perf: bool,
    pub morpho_api_url: String,
    /// Pause between two consecutive requests to the same API.
    pub request_delay_ms: u64,
    pub stablecoins_api_url: String,
    pub yields_api_url: String,
}

pub fn get_env_config() -> EnvConfig {
    EnvConfig {
        coins_api_url: get_env_var("COINS_API_URL")
            .unwrap_or_else(|| "https://coins.llama.fi".to_string()),
        defi_llama_api_url: get_env_var("DEFI_LLAMA_API_URL")
            .unwrap_or_else(|| "https://api.llama.fi".to_string()),
        log_json: get_env_bool("LOG_JSON").unwrap_or(false),
        log_perf: get_env_bool("LOG_PERF").unwrap_or(false),
        morpho_api_url: get_env_var("MORPHO_API_URL")
            .unwrap_or_else(|| "https://api.morpho.org/graphql".to_string()),
        request_delay_ms: get_env_u64("REQUEST_DELAY_MS").unwrap_or(250),
        stablecoins_api_url: get_env_var("STABLECOINS_API_URL")
            .unwrap_or_else(|| "https://stablecoins.llama.fi".to_string()),
        yields_api_url: get_env_var("YIELDS_API_URL")
            .unwrap_or_else(|| "https://yields.llama.fi".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_var_safe_some() {
        let test_key = "TEST_KEY_SAFE_SOME";
        let test_value = "my-env-value";
        std::env::set_var(test_key, test_value);
        assert_eq!(get_env_var(test_key), Some(test_value.to_string()));
    }

    #[test]
    fn test_get_env_var_safe_none() {
        let key = get_env_var("DOESNT_EXIST");
        assert!(key.is_none());
    }

    #[test]
    fn test_get_env_bool_not_there() {
        let flag = get_env_bool("DOESNT_EXIST");
        assert_eq!(flag, None);
    }

    #[test]
    fn test_get_env_bool_true_upper() {
        let test_key = "TEST_KEY_BOOL_TRUE_UPPER";
        std::env::set_var(test_key, "TRUE");
        assert_eq!(get_env_bool(test_key), Some(true));
    }

    #[test]
    fn test_get_env_bool_false() {
        let test_key = "TEST_KEY_BOOL_FALSE";
        std::env::set_var(test_key, "0");
        assert_eq!(get_env_bool(test_key), Some(false));
    }

    #[test]
    fn test_get_env_u64() {
        let test_key = "TEST_KEY_REQUEST_DELAY";
        std::env::set_var(test_key, "1000");
        assert_eq!(get_env_u64(test_key), Some(1000));
    }

    #[test]
    #[should_panic]
    fn test_get_env_u64_invalid_panics() {
        let test_key = "TEST_KEY_REQUEST_DELAY_INVALID";
        std::env::set_var(test_key, "soon");
        get_env_u64(test_key);
    }
}
