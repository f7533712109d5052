//! Built-in extension to mime type table used to seed a new catalog.

use std::collections::BTreeSet;

/// Top-level types a catalog knows how to hold.
const MEDIA_TOPLEVELS: &[&str] = &["image", "audio", "video"];

/// Returns `(".ext", "type/subtype")` pairs for every media extension
/// `mime_guess` knows about, sorted by extension.
///
/// An extension listed under a media type but whose preferred type lies
/// elsewhere is left out.
pub fn builtin_media_types() -> Vec<(String, String)> {
    let extensions: BTreeSet<&str> = MEDIA_TOPLEVELS
        .iter()
        .filter_map(|top| mime_guess::get_extensions(top, "*"))
        .flat_map(|exts| exts.iter().copied())
        .collect();

    extensions
        .into_iter()
        .filter_map(|ext| {
            let mime_type = mime_guess::from_ext(ext).first_raw()?;
            let top = mime_type.split('/').next()?;
            MEDIA_TOPLEVELS
                .contains(&top)
                .then(|| (format!(".{}", ext.to_lowercase()), mime_type.to_string()))
        })
        .collect()
}
