/// 启动检查
pub mod checks;

pub use checks::run_startup_checks;
