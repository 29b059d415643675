//! Secure Storage Module
//!
//! Keyed JSON records on disk, encrypted with DPAPI on Windows.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info};

#[cfg(windows)]
use windows::Win32::Security::Cryptography::{
    CryptProtectData, CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN, CRYPT_INTEGER_BLOB,
};

/// Secure storage rooted at a single directory
#[derive(Debug, Clone)]
pub struct SecureStorage {
    storage_path: PathBuf,
}

impl SecureStorage {
    /// Create storage rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let storage_path = dir.into();

        if let Err(e) = std::fs::create_dir_all(&storage_path) {
            error!("Failed to create storage directory: {}", e);
        }

        debug!("Secure storage initialized at: {:?}", storage_path);

        Self { storage_path }
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    /// Serialize and write a record
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<(), StorageError> {
        let json = serde_json::to_vec(data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let encrypted = protect(&json)?;

        std::fs::write(self.file_for(key), encrypted)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        debug!("Saved encrypted data for key: {}", key);
        Ok(())
    }

    /// Read and deserialize a record
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<T, StorageError> {
        let file_path = self.file_for(key);

        let encrypted = match std::fs::read(&file_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        let decrypted = unprotect(&encrypted)?;

        serde_json::from_slice(&decrypted)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Delete a record if present
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        let file_path = self.file_for(key);

        if file_path.exists() {
            std::fs::remove_file(&file_path)
                .map_err(|e| StorageError::Io(e.to_string()))?;
            info!("Deleted stored data for key: {}", key);
        }

        Ok(())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_for(key).exists()
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.storage_path.join(format!("{}.dat", key))
    }
}

#[cfg(windows)]
fn protect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    dpapi(data, true).map_err(|_| StorageError::Encryption("DPAPI encryption failed".into()))
}

#[cfg(windows)]
fn unprotect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    dpapi(data, false).map_err(|_| StorageError::Decryption("DPAPI decryption failed".into()))
}

#[cfg(windows)]
fn dpapi(data: &[u8], encrypt: bool) -> windows::core::Result<Vec<u8>> {
    let input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };
    let mut output = CRYPT_INTEGER_BLOB {
        cbData: 0,
        pbData: std::ptr::null_mut(),
    };

    unsafe {
        if encrypt {
            CryptProtectData(&input, None, None, None, None, CRYPTPROTECT_UI_FORBIDDEN, &mut output)?;
        } else {
            CryptUnprotectData(&input, None, None, None, None, CRYPTPROTECT_UI_FORBIDDEN, &mut output)?;
        }

        let bytes = std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec();

        // DPAPI allocates the output buffer with LocalAlloc
        windows::Win32::Foundation::LocalFree(windows::Win32::Foundation::HLOCAL(
            output.pbData as *mut std::ffi::c_void,
        ));

        Ok(bytes)
    }
}

// Plaintext outside Windows (development only)
#[cfg(not(windows))]
fn protect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    Ok(data.to_vec())
}

#[cfg(not(windows))]
fn unprotect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    Ok(data.to_vec())
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No stored data for key: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),
}
