pub mod init;
pub mod install;
pub mod status;
pub mod up;
