//! Configuration loading, merging, and scope-file management.

pub mod loader;
pub mod merge;
pub mod paths;
pub mod store;
pub mod validate;

pub use loader::{diagnose_dir, load, load_dirs, load_single, LoadedConfig};
pub use merge::merge_scopes;
pub use paths::APP_NAME;
pub use store::{read_scope_file, remove_asset, write_asset, write_settings_field};
pub use validate::{is_kebab_tag, is_module_path, validate_config, Issue};
