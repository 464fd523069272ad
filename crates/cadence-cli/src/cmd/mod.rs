pub mod checkpoint;
pub mod graduate;
pub mod init;
pub mod log;
pub mod render;
pub mod run;
pub mod session;
pub mod task;
