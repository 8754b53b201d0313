//! Fixture builders: archives, releases and stand-in executables.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;

use crate::upgrade::release::{Asset, Platform, Release};
use crate::upgrade::verification::compute_sha256;
use crate::utils::set_executable;

/// Build a gzip-compressed tar archive from `(path, contents, mode)` entries.
pub fn build_tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, data, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).expect("append tar entry");
    }

    builder.into_inner().expect("finish tar").finish().expect("finish gzip")
}

/// Shell script printing `version` for any arguments.
pub fn script_binary(version: &str) -> Vec<u8> {
    format!("#!/bin/sh\necho \"{version}\"\n").into_bytes()
}

/// Shell script that always exits with status 1.
pub fn failing_binary() -> Vec<u8> {
    b"#!/bin/sh\necho \"boom\" >&2\nexit 1\n".to_vec()
}

/// Write `contents` to `path` with mode 0755.
pub fn write_executable(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, contents).expect("write executable");
    set_executable(path).expect("chmod executable");
}

/// Release asset name for `binary` on `platform`, e.g. `pchaind_2.0.0_linux_amd64.tar.gz`.
pub fn archive_name(binary: &str, tag: &str, platform: &Platform) -> String {
    format!("{binary}_{}_{}_{}.tar.gz", tag.trim_start_matches('v'), platform.os, platform.arch)
}

/// A release carrying one archive for `platform`, plus a `checksums.txt` asset
/// when `with_manifest` is set.
///
/// Download URLs are `{base_url}/download/{name}`. Also returns the manifest
/// text matching `archive`, whether or not it is listed.
pub fn release_for(
    base_url: &str,
    tag: &str,
    binary: &str,
    platform: &Platform,
    archive: &[u8],
    with_manifest: bool,
) -> (Release, String) {
    let name = archive_name(binary, tag, platform);
    let digest = compute_sha256(archive);
    let manifest = format!("{digest}  {name}\n");

    let mut assets = vec![Asset {
        name: name.clone(),
        size: archive.len() as u64,
        download_url: format!("{base_url}/download/{name}"),
    }];
    if with_manifest {
        assets.push(Asset {
            name: "checksums.txt".to_string(),
            size: manifest.len() as u64,
            download_url: format!("{base_url}/download/checksums.txt"),
        });
    }

    let release = Release {
        tag: tag.to_string(),
        changelog: "- faster block sync\n- bug fixes".to_string(),
        landing_url: format!("{base_url}/releases/tag/{tag}"),
        assets,
    };
    (release, manifest)
}
