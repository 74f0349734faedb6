//! In-memory [`RemoteFs`] for tests

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWrite;

use super::error::SftpError;
use super::path_utils::remote_parent;
use super::remote_fs::{RemoteFs, RemoteWriter};
use super::types::{FileInfo, FileType};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { data: Vec<u8>, mtime: i64 },
}

/// A remote tree held in a map, counting every mutating call
#[derive(Clone, Default)]
pub struct MemoryFs {
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    mutations: Arc<AtomicUsize>,
    /// Mtime stamped on files written through `create_file`
    pub write_mtime: i64,
}

impl MemoryFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.nodes.lock().insert("/".to_string(), Node::Dir);
        fs
    }

    /// Seed a directory and its ancestors (not counted as a mutation)
    pub fn add_dir(&self, path: &str) {
        let mut nodes = self.nodes.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    /// Seed a file with its ancestors (not counted as a mutation)
    pub fn add_file(&self, path: &str, data: &[u8], mtime: i64) {
        self.add_dir(&remote_parent(path));
        self.nodes.lock().insert(
            path.to_string(),
            Node::File {
                data: data.to_vec(),
                mtime,
            },
        );
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.lock().contains_key(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.lock().get(path), Some(Node::Dir))
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.lock().get(path) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Every path currently in the tree, sorted
    pub fn paths(&self) -> Vec<String> {
        self.nodes.lock().keys().cloned().collect()
    }

    fn mutate(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn info(path: &str, node: &Node) -> FileInfo {
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        match node {
            Node::Dir => FileInfo {
                name,
                path: path.to_string(),
                file_type: FileType::Directory,
                size: 0,
                modified: 0,
            },
            Node::File { data, mtime } => FileInfo {
                name,
                path: path.to_string(),
                file_type: FileType::File,
                size: data.len() as u64,
                modified: *mtime,
            },
        }
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn stat(&self, path: &str) -> Result<Option<FileInfo>, SftpError> {
        Ok(self.nodes.lock().get(path).map(|n| Self::info(path, n)))
    }

    async fn lstat(&self, path: &str) -> Result<Option<FileInfo>, SftpError> {
        self.stat(path).await
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>, SftpError> {
        let nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::Dir) => {}
            Some(_) => return Err(SftpError::NotADirectory(path.to_string())),
            None => return Err(SftpError::FileNotFound(path.to_string())),
        }
        Ok(nodes
            .iter()
            .filter(|(p, _)| p.as_str() != path && remote_parent(p) == path)
            .map(|(p, n)| Self::info(p, n))
            .collect())
    }

    async fn create_dir(&self, path: &str) -> Result<(), SftpError> {
        self.mutate();
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(path) {
            return Err(SftpError::ProtocolError(format!("{} already exists", path)));
        }
        if !matches!(nodes.get(&remote_parent(path)), Some(Node::Dir)) {
            return Err(SftpError::FileNotFound(remote_parent(path)));
        }
        nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.mutate();
        match self.nodes.lock().remove(path) {
            Some(Node::File { .. }) => Ok(()),
            _ => Err(SftpError::FileNotFound(path.to_string())),
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.mutate();
        let mut nodes = self.nodes.lock();
        if nodes.keys().any(|p| p != path && remote_parent(p) == path) {
            return Err(SftpError::ProtocolError(format!("{} is not empty", path)));
        }
        match nodes.remove(path) {
            Some(Node::Dir) => Ok(()),
            _ => Err(SftpError::FileNotFound(path.to_string())),
        }
    }

    async fn create_file(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        self.mutate();
        let mut nodes = self.nodes.lock();
        if !matches!(nodes.get(&remote_parent(path)), Some(Node::Dir)) {
            return Err(SftpError::FileNotFound(remote_parent(path)));
        }
        nodes.insert(
            path.to_string(),
            Node::File {
                data: Vec::new(),
                mtime: self.write_mtime,
            },
        );
        Ok(Box::new(MemoryWriter {
            nodes: self.nodes.clone(),
            path: path.to_string(),
        }))
    }
}

struct MemoryWriter {
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    path: String,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if let Some(Node::File { data, .. }) = self.nodes.lock().get_mut(&self.path) {
            data.extend_from_slice(buf);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
