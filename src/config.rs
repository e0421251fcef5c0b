use std::env;
use std::path::PathBuf;

/// Returns the value of the named environment variable if it exists or panics.
pub fn get_variable(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("must define {} environment variable", name))
}

/// Returns the value of the named environment variable, or `default`
/// if it isn't set.
pub fn get_variable_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

/// Returns the named environment variable as a path, or panics.
pub fn get_directory(name: &str) -> PathBuf {
    PathBuf::from(get_variable(name))
}
