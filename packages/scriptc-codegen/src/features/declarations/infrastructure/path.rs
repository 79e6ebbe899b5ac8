//! Source path normalization
//!
//! Paths index the table case-insensitively, relative to the configured base
//! directory and with `/` separators: `C:\App\.\Lib\A.php` under base
//! `C:\App` becomes `lib/a.php`.

pub fn normalize_path(path: &str, base_directory: Option<&str>) -> String {
    let mut normalized = fold(path);

    if let Some(base) = base_directory {
        let base = fold(base);
        let base = base.trim_end_matches('/');
        if !base.is_empty() {
            if let Some(rest) = normalized.strip_prefix(base) {
                if rest.is_empty() || rest.starts_with('/') {
                    normalized = rest.to_string();
                }
            }
        }
    }

    let segments: Vec<&str> = normalized
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    segments.join("/")
}

fn fold(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}
