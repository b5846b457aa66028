//! Shell scripts standing in for yt-dlp and ffmpeg in unit tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script into `dir`
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Script prelude that sets `$prefix` from yt-dlp's `--output <prefix>.%(ext)s`
pub(crate) const YT_DLP_PREFIX: &str = r#"prefix=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then
    prefix="$(dirname "$2")/$(basename "$2" '.%(ext)s')"
    shift
  fi
  shift
done"#;
