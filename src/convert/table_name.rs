use std::path::Path;

/// Table name used when neither an explicit name nor a source file name is available.
pub const DEFAULT_TABLE_NAME: &str = "features";

/// Base name for a new table: the explicit name, else the source file name
/// without its extension, else [`DEFAULT_TABLE_NAME`]. Empty names are skipped.
pub fn base_table_name(explicit: Option<&str>, source_path: Option<&Path>) -> String {
    let from_path = source_path
        .and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned());

    explicit
        .map(str::to_string)
        .filter(|name| !name.is_empty())
        .or(from_path.filter(|name| !name.is_empty()))
        .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string())
}

/// Append `_1`, `_2`, ... to `base` until it names no existing table.
///
/// Names are compared case-insensitively, the same way SQLite compares table
/// names.
pub fn resolve_table_name<S: AsRef<str>>(base: &str, existing: &[S]) -> String {
    let taken = |candidate: &str| {
        existing
            .iter()
            .any(|name| name.as_ref().eq_ignore_ascii_case(candidate))
    };

    let mut name = base.to_string();
    let mut count = 1;
    while taken(&name) {
        name = format!("{base}_{count}");
        count += 1;
    }

    if name != base {
        log::debug!("table {base} exists, using {name}");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_TABLE_NAME, base_table_name, resolve_table_name};
    use std::path::Path;

    #[test]
    fn unused_base_is_kept() {
        assert_eq!(resolve_table_name::<&str>("roads", &[]), "roads");
        assert_eq!(resolve_table_name("roads", &["rivers", "roads_1"]), "roads");
    }

    #[test]
    fn suffix_skips_existing_names() {
        let existing = ["roads", "roads_1", "roads_2"];
        assert_eq!(resolve_table_name("roads", &existing), "roads_3");
    }

    #[test]
    fn comparison_ignores_case() {
        assert_eq!(resolve_table_name("Roads", &["ROADS"]), "Roads_1");
        assert_eq!(resolve_table_name("roads", &["Roads", "ROADS_1"]), "roads_2");
    }

    #[test]
    fn base_name_sources() {
        let path = Path::new("/data/rivers.geojson");
        assert_eq!(base_table_name(Some("lakes"), Some(path)), "lakes");
        assert_eq!(base_table_name(Some(""), Some(path)), "rivers");
        assert_eq!(base_table_name(None, Some(Path::new("a.geo.json"))), "a.geo");
        assert_eq!(base_table_name(None, None), DEFAULT_TABLE_NAME);
    }
}
