use std::collections::HashMap;

/// Bidirectional mapping between FUSE inodes and absolute mount-tree paths.
pub struct InodeTable {
    path_to_inode: HashMap<String, u64>,
    inode_to_path: HashMap<u64, String>,
    next_inode: u64,
}

impl InodeTable {
    /// The root directory is always inode 1.
    pub fn new() -> Self {
        let mut table = Self {
            path_to_inode: HashMap::new(),
            inode_to_path: HashMap::new(),
            next_inode: 2,
        };
        table.path_to_inode.insert("/".to_string(), 1);
        table.inode_to_path.insert(1, "/".to_string());
        table
    }

    pub fn get_or_create(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_inode.get(path) {
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.path_to_inode.insert(path.to_string(), ino);
        self.inode_to_path.insert(ino, path.to_string());
        ino
    }

    pub fn get_path(&self, inode: u64) -> Option<&str> {
        self.inode_to_path.get(&inode).map(|s| s.as_str())
    }

    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).copied()
    }

    pub fn remove(&mut self, inode: u64) {
        if let Some(path) = self.inode_to_path.remove(&inode) {
            self.path_to_inode.remove(&path);
        }
    }

    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(ino) = self.path_to_inode.remove(from) {
            self.path_to_inode.insert(to.to_string(), ino);
            self.inode_to_path.insert(ino, to.to_string());
        }
    }

    /// The parent directory of `path`, `"/"` if `path` is already top-level.
    pub fn parent_of(path: &str) -> String {
        match path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
            None => "/".to_string(),
        }
    }

    pub fn file_name_of(path: &str) -> String {
        path.rsplit('/').next().unwrap_or("").to_string()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
