//! Environment construction for toolchain invocations.

/// Merge override variables into a base environment.
///
/// Each key appears once. Base keys keep their position; an override replaces
/// the value of an existing key and new override keys are appended in the
/// order given.
pub fn merge_env<I, K, V>(base: I, overrides: &[(String, String)]) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut merged: Vec<(String, String)> = Vec::new();
    for (key, value) in base {
        let key = key.into();
        let value = value.into();
        match merged.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => merged.push((key, value)),
        }
    }
    for (key, value) in overrides {
        match merged.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value.clone(),
            None => merged.push((key.clone(), value.clone())),
        }
    }
    merged
}

/// The current process environment merged with `overrides`.
///
/// Variables whose name or value is not valid Unicode are skipped.
pub fn inherited_env(overrides: &[(String, String)]) -> Vec<(String, String)> {
    let base = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    merge_env(base, overrides)
}
