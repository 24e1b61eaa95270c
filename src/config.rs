use crate::prelude::*;
use std::env;
use std::str::FromStr;

/// How the redistribution engine moves data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RedistMode {
    /// Use the cheapest sequence of specialized collectives.
    Auto,

    /// Always use the general element-shuffling fallback.
    General,
}

impl Default for RedistMode {
    fn default() -> Self {
        RedistMode::Auto
    }
}

/// Parameters of the gemm algorithm selection.
#[derive(Debug, Clone, PartialEq)]
pub struct GemmTuning {
    pub weight_towards_c: f64,
    pub weight_away_from_dot: f64,
    pub block_size_dot: usize,

    /// Whether the default selection may pick the panel-dot variant.
    pub allow_dot: bool,
}

impl Default for GemmTuning {
    fn default() -> Self {
        Self {
            weight_towards_c: 2.0,
            weight_away_from_dot: 10.0,
            block_size_dot: 2000,
            allow_dot: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceConfig {
    /// Panel width of the blocked algorithms.
    pub blocksize: usize,
    pub gemm: GemmTuning,
    pub sync_pool_size: usize,
    pub redist_mode: RedistMode,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            blocksize: 128,
            gemm: default(),
            sync_pool_size: 4,
            redist_mode: RedistMode::Auto,
        }
    }
}

fn parse_env<T: FromStr>(name: &str, valid: impl Fn(&T) -> bool) -> Option<T> {
    let value = env::var(name).ok()?;

    match value.trim().parse::<T>() {
        Ok(v) if valid(&v) => Some(v),
        _ => {
            warn!("invalid value {:?} for {}, using the default", value, name);
            None
        }
    }
}

impl PerformanceConfig {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(blocksize) = parse_env("GRIDLA_BLOCKSIZE", |&n: &usize| n > 0) {
            out.blocksize = blocksize;
        }

        if let Some(size) = parse_env("GRIDLA_SYNC_POOL_SIZE", |&n: &usize| n > 0) {
            out.sync_pool_size = size;
        }

        if let Some(size) = parse_env("GRIDLA_GEMM_DOT_BLOCKSIZE", |&n: &usize| n > 0) {
            out.gemm.block_size_dot = size;
        }

        if let Ok(level) = env::var("GRIDLA_GEMM_DOT") {
            out.gemm.allow_dot = match level.trim() {
                "1" | "on" | "true" => true,
                "0" | "off" | "false" | "" => false,
                s => {
                    warn!("unknown value {:?} for GRIDLA_GEMM_DOT, keeping it disabled", s);
                    false
                }
            };
        }

        if let Ok(mode) = env::var("GRIDLA_REDIST") {
            out.redist_mode = match mode.trim() {
                "auto" | "" => RedistMode::Auto,
                "general" => RedistMode::General,
                s => {
                    warn!("unknown redistribution mode {:?}, reverting to auto", s);
                    RedistMode::Auto
                }
            };
        }

        debug!("performance configuration: {:?}", out);
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PerformanceConfig::default();
        assert_eq!(config.blocksize, 128);
        assert_eq!(config.sync_pool_size, 4);
        assert_eq!(config.gemm.weight_towards_c, 2.0);
        assert_eq!(config.gemm.weight_away_from_dot, 10.0);
        assert_eq!(config.gemm.block_size_dot, 2000);
        assert!(!config.gemm.allow_dot);
        assert_eq!(config.redist_mode, RedistMode::Auto);
    }

    #[test]
    fn test_parse_env() {
        env::set_var("GRIDLA_TEST_PARSE_OK", " 64 ");
        env::set_var("GRIDLA_TEST_PARSE_BAD", "many");
        env::set_var("GRIDLA_TEST_PARSE_ZERO", "0");

        assert_eq!(parse_env("GRIDLA_TEST_PARSE_OK", |&n: &usize| n > 0), Some(64));
        assert_eq!(parse_env::<usize>("GRIDLA_TEST_PARSE_BAD", |_| true), None);
        assert_eq!(parse_env("GRIDLA_TEST_PARSE_ZERO", |&n: &usize| n > 0), None);
        assert_eq!(parse_env::<usize>("GRIDLA_TEST_PARSE_MISSING", |_| true), None);
    }
}
