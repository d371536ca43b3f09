use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use atomic_write_file::AtomicWriteFile;
use serde::{Deserialize, Serialize};

use super::LayoutDocument;

const PERSIST_CACHE_VERSION: &str = "1";
const CACHE_FILE_SUFFIX: &str = ".layout.json";

/// On-disk cache of [LayoutDocument]s, one JSON file per PDF, keyed by the PDF's content hash.
pub struct LayoutCache {
    dir: PathBuf,
}

impl LayoutCache {
    /// Uses `dir` for cache files, creating it if needed.
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating layout cache directory {:?}", dir))?;
        Ok(Self { dir })
    }

    /// Path of the cache file for `pdf_path`: `{stem}.layout.json` in the cache directory.
    pub fn path_for(&self, pdf_path: &Path) -> Result<PathBuf> {
        let stem = pdf_path
            .file_stem()
            .ok_or_else(|| anyhow!("PDF path {:?} has no file name", pdf_path))?;
        let mut file_name = stem.to_owned();
        file_name.push(CACHE_FILE_SUFFIX);
        Ok(self.dir.join(file_name))
    }

    /// Returns the cached document for `pdf_path`, or `None` if there is no entry, the entry has
    /// another format version, or it was produced from different PDF content.
    pub fn load(&self, pdf_path: &Path) -> Result<Option<LayoutDocument>> {
        let cache_path = self.path_for(pdf_path)?;
        let Some(entry) = Self::read_cache_file(&cache_path)? else {
            return Ok(None);
        };

        if entry.version != PERSIST_CACHE_VERSION {
            log::info!(
                "Layout cache entry {:?} has version {:?}, ignoring.",
                cache_path,
                entry.version
            );
            return Ok(None);
        }

        let pdf_hash = hash_file(pdf_path)?;
        if entry.pdf_sha256 != pdf_hash {
            log::info!(
                "Layout cache entry {:?} was produced from different content, ignoring.",
                cache_path
            );
            return Ok(None);
        }

        Ok(Some(entry.document))
    }

    /// Stores `document` as the entry for `pdf_path`, replacing any existing one atomically.
    pub fn store(&self, pdf_path: &Path, document: &LayoutDocument) -> Result<()> {
        let cache_path = self.path_for(pdf_path)?;
        let entry = PersistantEntryRef {
            version: PERSIST_CACHE_VERSION,
            pdf_sha256: hash_file(pdf_path)?,
            document,
        };

        let mut cache_file = AtomicWriteFile::open(&cache_path)
            .with_context(|| format!("opening file {:?} to write cache", cache_path))?;
        serde_json::to_writer(&mut cache_file, &entry)
            .with_context(|| format!("writing cache as JSON to file {:?}", cache_path))?;
        cache_file
            .commit()
            .with_context(|| format!("committing cache file {:?}", cache_path))?;

        log::debug!("Stored layout output in {:?}.", cache_path);
        Ok(())
    }

    fn read_cache_file(cache_path: &Path) -> Result<Option<PersistantEntry>> {
        let cache_file = match File::open(cache_path) {
            Ok(cache_file) => cache_file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(err) => {
                Err(err).with_context(|| format!("opening file {:?} to read cache", cache_path))?
            }
        };
        let entry: PersistantEntry = serde_json::from_reader(std::io::BufReader::new(cache_file))
            .with_context(|| format!("reading cache as JSON from file {:?}", cache_path))?;
        Ok(Some(entry))
    }
}

#[derive(Deserialize)]
struct PersistantEntry {
    version: String,
    pdf_sha256: HashDigest,
    document: LayoutDocument,
}

#[derive(Serialize)]
struct PersistantEntryRef<'a> {
    version: &'a str,
    pdf_sha256: HashDigest,
    document: &'a LayoutDocument,
}

type HashAlgo = sha::sha256::Sha256;

const HASH_DIGEST_LEN: usize = 32;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "OwnString")]
pub struct HashDigest([u8; HASH_DIGEST_LEN]);

impl TryFrom<String> for HashDigest {
    type Error = anyhow::Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let mut digest = HashDigest::default();
        hex::decode_to_slice(value, &mut digest.0)?;
        Ok(digest)
    }
}

#[derive(Serialize)]
struct OwnString(String);

impl From<HashDigest> for OwnString {
    fn from(value: HashDigest) -> Self {
        OwnString(hex::encode(value.0))
    }
}

impl std::fmt::Display for HashDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// SHA-256 of the file's content.
pub fn hash_file(path: &Path) -> Result<HashDigest> {
    let mut f =
        File::open(path).with_context(|| format!("opening file {:?} for hashing", path))?;
    let mut hash = HashAlgo::default();
    std::io::copy(&mut f, &mut hash)
        .with_context(|| format!("reading file {:?} for hashing", path))?;
    hash_digest(&mut hash).with_context(|| "generating PDF content hash")
}

fn hash_digest(hash: &mut HashAlgo) -> Result<HashDigest> {
    hash.flush().with_context(|| "flushing hash")?;
    let digest_vec = sha::utils::DigestExt::to_bytes(hash);
    let mut digest = HashDigest::default();
    if digest_vec.len() != HASH_DIGEST_LEN {
        return Err(anyhow!(
            "hash produced {} bytes, expected {HASH_DIGEST_LEN}",
            digest_vec.len()
        ));
    }
    digest.0.copy_from_slice(&digest_vec);
    Ok(digest)
}
