//! Build context packaging.

use std::path::Path;

use dockyard_common::{EngineError, EngineResult};

pub const DOCKERFILE: &str = "Dockerfile";

/// Packs a build context directory into an uncompressed tarball.
pub fn pack_build_context(context: &Path) -> EngineResult<Vec<u8>> {
    if !context.is_dir() {
        return Err(EngineError::Build(format!(
            "build context {} is not a directory",
            context.display()
        )));
    }
    if !context.join(DOCKERFILE).is_file() {
        return Err(EngineError::Build(format!(
            "no {DOCKERFILE} found in {}",
            context.display()
        )));
    }

    let mut archive = tar::Builder::new(Vec::new());
    archive.follow_symlinks(true);
    archive.append_dir_all(".", context)?;
    Ok(archive.into_inner()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_pack_contains_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DOCKERFILE), "FROM alpine:latest\n").unwrap();
        std::fs::write(dir.path().join("web_app.py"), "print('hi')\n").unwrap();

        let tarball = pack_build_context(dir.path()).unwrap();
        let mut archive = tar::Archive::new(tarball.as_slice());
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            if path.ends_with(DOCKERFILE) {
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                assert_eq!(content, "FROM alpine:latest\n");
            }
            names.push(path);
        }

        assert!(names.iter().any(|n| n.ends_with(DOCKERFILE)));
        assert!(names.iter().any(|n| n.ends_with("web_app.py")));
    }

    #[test]
    fn test_missing_dockerfile_is_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = pack_build_context(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::Build(_)));

        let err = pack_build_context(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, EngineError::Build(_)));
    }
}
