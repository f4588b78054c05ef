use std::fs;

use camino::Utf8Path;

use crate::error::AdapterError;

/// Concatenates `parts` after `banner`, byte for byte, in the given order.
///
/// No separators are injected: each part contributes exactly the bytes it
/// already has, including (or lacking) its trailing newline. Order matters,
/// a module relying on a global defined by another has to come after it.
pub fn assemble<I, P>(banner: &str, parts: I) -> Vec<u8>
where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
{
    let mut out = banner.as_bytes().to_vec();
    for part in parts {
        out.extend_from_slice(part.as_ref());
    }
    out
}

/// Reads every file in `paths` and assembles them after `banner`.
pub fn assemble_files(banner: &str, paths: &[impl AsRef<Utf8Path>]) -> Result<Vec<u8>, AdapterError> {
    let parts = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            fs::read(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AdapterError::MissingInput(path.to_owned()),
                _ => AdapterError::Io(path.to_owned(), e),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(assemble(banner, parts))
}
