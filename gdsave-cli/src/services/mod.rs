pub mod save_file_service;
pub mod save_locator;
