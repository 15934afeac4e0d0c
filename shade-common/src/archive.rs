//! Archive sources and the jar writer
//!
//! Inputs can be directories (compiled classes, resources), jars/zips,
//! or tarballs (`.tar`, `.tar.gz`, `.tar.zst`). Only file entries are read;
//! directory entries are implied by the paths of the files under them.

use crate::error::{Result, ShadeError};
use crate::paths::entry;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// A single file inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Forward-slash path, no leading `/` or `./`
    pub path: String,
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: entry::normalize(&path.into()),
            data: data.into(),
        }
    }
}

/// How an input is laid out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Directory,
    Jar,
    Tar,
    TarGz,
    TarZst,
}

impl SourceKind {
    /// Detect the kind from the filesystem and file name
    pub fn detect(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(Self::Directory);
        }
        if !path.exists() {
            return Err(ShadeError::InputNotFound(path.to_path_buf()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".jar") || name.ends_with(".zip") {
            Ok(Self::Jar)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar.zst") {
            Ok(Self::TarZst)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else {
            Err(ShadeError::UnsupportedArchive(path.to_path_buf()))
        }
    }
}

/// One ordered input to the packager
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    /// Human-readable origin, used in reports and duplicate errors
    pub label: String,
    pub path: PathBuf,
    pub kind: SourceKind,
    /// Apply resource filtering to this source's entries
    pub filtered: bool,
}

impl ArchiveSource {
    pub fn open(label: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let kind = SourceKind::detect(&path)?;
        Ok(Self {
            label: label.into(),
            path,
            kind,
            filtered: false,
        })
    }

    /// Mark this source for resource filtering
    pub fn filtered(mut self) -> Self {
        self.filtered = true;
        self
    }

    /// Read every file entry, in the source's natural order
    pub fn read_entries(&self) -> Result<Vec<Entry>> {
        let entries = match self.kind {
            SourceKind::Directory => read_directory(&self.path)?,
            SourceKind::Jar => read_jar(&self.path)?,
            SourceKind::Tar => {
                let file = open(&self.path)?;
                read_tar(&self.path, BufReader::new(file))?
            }
            SourceKind::TarGz => {
                let file = open(&self.path)?;
                read_tar(&self.path, flate2::read::GzDecoder::new(BufReader::new(file)))?
            }
            SourceKind::TarZst => {
                let file = open(&self.path)?;
                let mut reader = BufReader::new(file);
                let decoder = ruzstd::decoding::StreamingDecoder::new(&mut reader)
                    .map_err(|e| ShadeError::archive_read(&self.path, e))?;
                read_tar(&self.path, decoder)?
            }
        };
        tracing::debug!("Read {} entries from {}", entries.len(), self.label);
        Ok(entries)
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| ShadeError::io(path, e))
}

fn read_directory(root: &Path) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for item in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let item = item.map_err(|e| ShadeError::archive_read(root, e))?;
        if !item.file_type().is_file() {
            continue;
        }
        let relative = item
            .path()
            .strip_prefix(root)
            .map_err(|e| ShadeError::archive_read(root, e))?;
        let data = fs::read(item.path()).map_err(|e| ShadeError::io(item.path(), e))?;
        entries.push(Entry::new(relative.to_string_lossy(), data));
    }

    Ok(entries)
}

fn read_jar(path: &Path) -> Result<Vec<Entry>> {
    let file = open(path)?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| ShadeError::archive_read(path, e))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ShadeError::archive_read(path, e))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|e| ShadeError::archive_read(path, format!("{}: {}", name, e)))?;
        entries.push(Entry::new(name, data));
    }

    Ok(entries)
}

fn read_tar<R: Read>(path: &Path, reader: R) -> Result<Vec<Entry>> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();

    for item in archive
        .entries()
        .map_err(|e| ShadeError::archive_read(path, e))?
    {
        let mut item = item.map_err(|e| ShadeError::archive_read(path, e))?;
        if !item.header().entry_type().is_file() {
            continue;
        }
        let name = item
            .path()
            .map_err(|e| ShadeError::archive_read(path, e))?
            .to_string_lossy()
            .into_owned();
        let mut data = Vec::with_capacity(item.size() as usize);
        item.read_to_end(&mut data)
            .map_err(|e| ShadeError::archive_read(path, format!("{}: {}", name, e)))?;
        entries.push(Entry::new(name, data));
    }

    Ok(entries)
}

/// Write entries to a jar, in the given order.
///
/// Timestamps and permissions are fixed so identical input produces an
/// identical file. The jar is written next to `output` and renamed over it,
/// so a failed build never leaves a half-written artifact behind.
pub fn write_jar(output: &Path, entries: &[Entry]) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ShadeError::io(parent, e))?;
    }

    let mut tmp_name = output.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let result = write_jar_to(&tmp_path, entries);
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, output).map_err(|e| ShadeError::io(output, e))
}

fn write_jar_to(path: &Path, entries: &[Entry]) -> Result<()> {
    let file = File::create(path).map_err(|e| ShadeError::io(path, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    for entry in entries {
        zip.start_file(entry.path.as_str(), options)
            .map_err(|e| ShadeError::archive_write(path, format!("{}: {}", entry.path, e)))?;
        zip.write_all(&entry.data)
            .map_err(|e| ShadeError::archive_write(path, format!("{}: {}", entry.path, e)))?;
    }

    let mut writer = zip
        .finish()
        .map_err(|e| ShadeError::archive_write(path, e))?;
    writer.flush().map_err(|e| ShadeError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_kinds() {
        let temp = TempDir::new().unwrap();
        assert_eq!(SourceKind::detect(temp.path()).unwrap(), SourceKind::Directory);

        for (name, kind) in [
            ("lib.jar", SourceKind::Jar),
            ("lib.zip", SourceKind::Jar),
            ("lib.tar", SourceKind::Tar),
            ("lib.tar.gz", SourceKind::TarGz),
            ("lib.tgz", SourceKind::TarGz),
            ("lib.tar.zst", SourceKind::TarZst),
        ] {
            let path = temp.path().join(name);
            fs::write(&path, b"").unwrap();
            assert_eq!(SourceKind::detect(&path).unwrap(), kind, "{}", name);
        }

        let odd = temp.path().join("lib.rar");
        fs::write(&odd, b"").unwrap();
        assert!(matches!(
            SourceKind::detect(&odd),
            Err(ShadeError::UnsupportedArchive(_))
        ));
        assert!(matches!(
            SourceKind::detect(&temp.path().join("missing.jar")),
            Err(ShadeError::InputNotFound(_))
        ));
    }

    #[test]
    fn test_directory_entries_are_sorted_and_relative() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::write(temp.path().join("a/b/D.class"), b"d").unwrap();
        fs::write(temp.path().join("a/b/C.class"), b"c").unwrap();
        fs::write(temp.path().join("plugin.yml"), b"p").unwrap();

        let source = ArchiveSource::open("classes", temp.path()).unwrap();
        let paths: Vec<String> = source
            .read_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["a/b/C.class", "a/b/D.class", "plugin.yml"]);
    }

    #[test]
    fn test_jar_roundtrip_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let entries = vec![
            Entry::new("x/y/C.class", b"class".to_vec()),
            Entry::new("plugin.yml", b"name: Test".to_vec()),
        ];

        let first = temp.path().join("out/first.jar");
        let second = temp.path().join("out/second.jar");
        write_jar(&first, &entries).unwrap();
        write_jar(&second, &entries).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
        assert!(!temp.path().join("out/first.jar.tmp").exists());

        let read = ArchiveSource::open("first", &first).unwrap().read_entries().unwrap();
        assert_eq!(read, entries);
    }

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_tar_source() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lib.tar");
        fs::write(
            &path,
            tar_bytes(&[("a/b/C.class", b"class"), ("plugin.yml", b"name: Test")]),
        )
        .unwrap();

        let entries = ArchiveSource::open("lib", &path).unwrap().read_entries().unwrap();
        assert_eq!(
            entries,
            vec![
                Entry::new("a/b/C.class", b"class".to_vec()),
                Entry::new("plugin.yml", b"name: Test".to_vec()),
            ]
        );
    }

    #[test]
    fn test_tar_gz_source() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("res.tar.gz");
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar_bytes(&[("conf/app.properties", b"key=value")]))
            .unwrap();
        fs::write(&path, gz.finish().unwrap()).unwrap();

        let entries = ArchiveSource::open("res", &path).unwrap().read_entries().unwrap();
        assert_eq!(entries, vec![Entry::new("conf/app.properties", b"key=value".to_vec())]);
    }

    #[test]
    fn test_tar_zst_source() {
        use ruzstd::encoding::{compress_to_vec, CompressionLevel};

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lib.tar.zst");
        let tar = tar_bytes(&[("META-INF/services/a.b.Api", b"a.b.Impl\n")]);
        fs::write(&path, compress_to_vec(&tar[..], CompressionLevel::Fastest)).unwrap();

        let entries = ArchiveSource::open("lib", &path).unwrap().read_entries().unwrap();
        assert_eq!(
            entries,
            vec![Entry::new("META-INF/services/a.b.Api", b"a.b.Impl\n".to_vec())]
        );
    }

    #[test]
    fn test_corrupt_tar_zst_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lib.tar.zst");
        fs::write(&path, b"not zstd").unwrap();

        let err = ArchiveSource::open("lib", &path).unwrap().read_entries().unwrap_err();
        assert!(matches!(err, ShadeError::ArchiveRead { .. }));
    }
}
