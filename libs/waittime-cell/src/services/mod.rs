pub mod estimator;
pub mod overrun;
