#![allow(clippy::too_many_arguments, clippy::many_single_char_names)]

pub mod blas;
pub mod comm;
pub mod config;
pub mod dist;
pub mod error;
pub mod grid;
pub mod lapack;
pub mod matrix;
mod prelude;
pub mod redist;
pub mod sync;

pub use config::{PerformanceConfig, RedistMode};
pub use dist::{Dist, DistMatrix, DistPair, DistView};
pub use error::{LogicError, RuntimeError, SingularMatrixError};
pub use grid::Grid;
pub use gridla_core::{DataType, Float, Scalar};
pub use matrix::{Matrix, MatrixView, MatrixViewMut};

pub fn hostname() -> &'static str {
    lazy_static::lazy_static! {
        static ref HOSTNAME: String = {
            match ::hostname::get() {
                Ok(s) => s.to_string_lossy().into_owned(),
                Err(_) => "<anonymous>".into(),
            }
        };
    };

    &*HOSTNAME
}

pub fn initialize_logger() {
    use std::time::Instant;

    lazy_static::lazy_static! {
        static ref START_TIMING: Instant = Instant::now();
    }

    let _ = *START_TIMING;

    let _ = env_logger::Builder::from_default_env()
        .format(|formatter, record| {
            use std::io::Write;
            let duration = START_TIMING.elapsed();

            writeln!(
                formatter,
                "[{} {} {:.06}] {}: {}",
                hostname(),
                record.module_path().unwrap_or("?"),
                duration.as_secs_f64(),
                record.level(),
                record.args(),
            )
        })
        .try_init();
}
