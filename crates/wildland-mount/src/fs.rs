use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyWrite, Request,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::core::MountCore;
use crate::inode::InodeTable;
use crate::manifest::PSEUDO_MANIFEST_NAME;

const ATTR_TTL: Duration = Duration::from_secs(1);
const BLOCK_SIZE: u32 = 512;

/// `fuser::Filesystem` bridging FUSE's synchronous upcalls to [`MountCore`]
/// via `tokio::runtime::Handle::block_on`, the same bridging style the
/// teacher's FUSE filesystem uses against its own async `Mount` (spec.md
/// §4.6, §5 "FUSE upcalls run on kernel-supplied threads").
pub struct WildlandFs {
    rt: Handle,
    core: Arc<MountCore>,
    inodes: Mutex<InodeTable>,
}

impl WildlandFs {
    pub fn new(rt: Handle, core: Arc<MountCore>) -> Self {
        Self {
            rt,
            core,
            inodes: Mutex::new(InodeTable::new()),
        }
    }

    fn make_attr(ino: u64, size: u64, is_dir: bool, mtime_unix: u64) -> FileAttr {
        let kind = if is_dir { FileType::Directory } else { FileType::RegularFile };
        let perm = if is_dir { 0o755 } else { 0o644 };
        let mtime = UNIX_EPOCH + Duration::from_secs(mtime_unix);
        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(BLOCK_SIZE as u64),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind,
            perm,
            nlink: 1,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Looks up a path's attributes, checking the pseudo-manifest and the
    /// synthetic-directory union before falling through to the owning
    /// backend's `stat` (spec.md §4.6).
    fn fetch_attr(&self, path: &str) -> Option<(u64, bool, u64)> {
        if path == "/" {
            return Some((0, true, 0));
        }

        if let Some(file_name) = path.rsplit('/').next() {
            if file_name == PSEUDO_MANIFEST_NAME {
                let root = InodeTable::parent_of(path);
                if let Some(pm) = self.core.pseudo_manifest_for(&root) {
                    return Some((pm.len(), false, 0));
                }
            }
        }

        let synthetic = self.core.table().synthetic_children(&InodeTable::parent_of(path));

        let core = self.core.clone();
        let path_owned = path.to_string();
        let result = self.rt.block_on(async move {
            let candidates = core.table().storages_owning(&path_owned);
            for storage in candidates {
                if let Ok(meta) = storage.backend.stat(&path_owned).await {
                    return Some((meta.size, meta.is_dir, meta.mtime_unix));
                }
            }
            None
        });

        result.or_else(|| {
            if synthetic.contains(&InodeTable::file_name_of(path)) {
                Some((0, true, 0))
            } else {
                None
            }
        })
    }
}

impl Filesystem for WildlandFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut fuser::KernelConfig) -> Result<(), libc::c_int> {
        tracing::info!("wildland mount filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!("wildland mount filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };

        let parent_path = {
            let inodes = self.inodes.lock();
            match inodes.get_path(parent) {
                Some(p) => p.to_string(),
                None => {
                    reply.error(libc::ENOENT);
                    return;
                }
            }
        };

        let path = if parent_path == "/" { format!("/{name}") } else { format!("{parent_path}/{name}") };

        match self.fetch_attr(&path) {
            Some((size, is_dir, mtime)) => {
                let ino = self.inodes.lock().get_or_create(&path);
                reply.entry(&ATTR_TTL, &Self::make_attr(ino, size, is_dir, mtime), 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.inodes.lock().get_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fetch_attr(&path) {
            Some((size, is_dir, mtime)) => reply.attr(&ATTR_TTL, &Self::make_attr(ino, size, is_dir, mtime)),
            None => reply.error(libc::ENOENT),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.inodes.lock().get_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let Some(size) = size else {
            match self.fetch_attr(&path) {
                Some((s, is_dir, mtime)) => reply.attr(&ATTR_TTL, &Self::make_attr(ino, s, is_dir, mtime)),
                None => reply.error(libc::ENOENT),
            }
            return;
        };

        let core = self.core.clone();
        let path_owned = path.clone();
        let result = self.rt.block_on(async move {
            let candidates = core.table().storages_owning(&path_owned);
            let primary = candidates.into_iter().next().ok_or(crate::error::MountError::NotFound(path_owned.clone()))?;
            if primary.read_only {
                return Err(crate::error::MountError::ReadOnly);
            }
            primary.backend.truncate(&path_owned, size).await.map_err(Into::into)
        });

        match result {
            Ok(()) => reply.attr(&ATTR_TTL, &Self::make_attr(ino, size, false, 0)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.inodes.lock().get_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        if path.rsplit('/').next() == Some(PSEUDO_MANIFEST_NAME) {
            let root = InodeTable::parent_of(&path);
            if let Some(pm) = self.core.pseudo_manifest_for(&root) {
                reply.data(&pm.read(offset.max(0) as u64, size));
                return;
            }
            reply.error(libc::ENOENT);
            return;
        }

        let core = self.core.clone();
        let path_owned = path.clone();
        let result = self
            .rt
            .block_on(async move { core.read_with_fallback(&path_owned, offset.max(0) as u64, size).await });

        match result {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match self.inodes.lock().get_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        if path.rsplit('/').next() == Some(PSEUDO_MANIFEST_NAME) {
            reply.error(libc::EROFS);
            return;
        }

        let core = self.core.clone();
        let path_owned = path.clone();
        let data_owned = data.to_vec();
        let offset = offset.max(0) as u64;
        let result = self.rt.block_on(async move {
            let candidates = core.table().storages_owning(&path_owned);
            let primary = candidates.into_iter().next().ok_or(crate::error::MountError::NotFound(path_owned.clone()))?;
            if primary.read_only {
                return Err(crate::error::MountError::ReadOnly);
            }
            primary.backend.write(&path_owned, offset, &data_owned).await.map_err(Into::into)
        });

        match result {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let path = match self.inodes.lock().get_path(ino) {
            Some(p) => p.to_string(),
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let mut entries: Vec<(String, bool)> = vec![(".".to_string(), true), ("..".to_string(), true)];

        for name in self.core.table().synthetic_children(&path) {
            entries.push((name, true));
        }

        let core = self.core.clone();
        let path_owned = path.clone();
        let backend_entries = self.rt.block_on(async move {
            let candidates = core.table().storages_owning(&path_owned);
            for storage in candidates {
                if let Ok(listing) = storage.backend.readdir(&path_owned).await {
                    return listing;
                }
            }
            vec![]
        });
        for entry in backend_entries {
            entries.push((entry.name, entry.is_dir));
        }

        if self.core.pseudo_manifest_for(&path).is_some() {
            entries.push((PSEUDO_MANIFEST_NAME.to_string(), false));
        }

        for (i, (name, is_dir)) in entries.into_iter().enumerate().skip(offset as usize) {
            let full_path = if path == "/" { format!("/{name}") } else { format!("{path}/{name}") };
            let child_ino = if name == "." {
                ino
            } else if name == ".." {
                self.inodes.lock().get_or_create(&InodeTable::parent_of(&path))
            } else {
                self.inodes.lock().get_or_create(&full_path)
            };
            let kind = if is_dir { FileType::Directory } else { FileType::RegularFile };
            if reply.add(child_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
        self.create_entry(parent, name, reply, true);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.remove_entry(parent, name, reply, false);
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.remove_entry(parent, name, reply, true);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(name), Some(newname)) = (name.to_str(), newname.to_str()) else {
            reply.error(libc::ENOENT);
            return;
        };

        let (from, to) = {
            let inodes = self.inodes.lock();
            let Some(parent_path) = inodes.get_path(parent) else {
                reply.error(libc::ENOENT);
                return;
            };
            let Some(new_parent_path) = inodes.get_path(newparent) else {
                reply.error(libc::ENOENT);
                return;
            };
            let from = if parent_path == "/" { format!("/{name}") } else { format!("{parent_path}/{name}") };
            let to = if new_parent_path == "/" { format!("/{newname}") } else { format!("{new_parent_path}/{newname}") };
            (from, to)
        };

        let core = self.core.clone();
        let from_owned = from.clone();
        let to_owned = to.clone();
        let result = self.rt.block_on(async move {
            let candidates = core.table().storages_owning(&from_owned);
            let primary = candidates.into_iter().next().ok_or(crate::error::MountError::NotFound(from_owned.clone()))?;
            primary.backend.rename(&from_owned, &to_owned).await.map_err(Into::into)
        });

        match result {
            Ok(()) => {
                self.inodes.lock().rename(&from, &to);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }
}

impl WildlandFs {
    fn create_entry(&self, parent: u64, name: &OsStr, reply: ReplyEntry, is_dir: bool) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let parent_path = match self.inodes.lock().get_path(parent) {
            Some(p) => p.to_string(),
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let path = if parent_path == "/" { format!("/{name}") } else { format!("{parent_path}/{name}") };

        let core = self.core.clone();
        let path_owned = path.clone();
        let result = self.rt.block_on(async move {
            let candidates = core.table().storages_owning(&InodeTable::parent_of(&path_owned));
            let primary = candidates.into_iter().next().ok_or(crate::error::MountError::NotFound(path_owned.clone()))?;
            if primary.read_only {
                return Err(crate::error::MountError::ReadOnly);
            }
            if is_dir {
                primary.backend.mkdir(&path_owned).await.map_err(Into::into)
            } else {
                primary.backend.create(&path_owned).await.map_err(Into::into)
            }
        });

        match result {
            Ok(()) => {
                let ino = self.inodes.lock().get_or_create(&path);
                reply.entry(&ATTR_TTL, &Self::make_attr(ino, 0, is_dir, 0), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn remove_entry(&self, parent: u64, name: &OsStr, reply: ReplyEmpty, is_dir: bool) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let parent_path = match self.inodes.lock().get_path(parent) {
            Some(p) => p.to_string(),
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let path = if parent_path == "/" { format!("/{name}") } else { format!("{parent_path}/{name}") };

        let core = self.core.clone();
        let path_owned = path.clone();
        let result = self.rt.block_on(async move {
            let candidates = core.table().storages_owning(&path_owned);
            let primary = candidates.into_iter().next().ok_or(crate::error::MountError::NotFound(path_owned.clone()))?;
            if primary.read_only {
                return Err(crate::error::MountError::ReadOnly);
            }
            if is_dir {
                primary.backend.rmdir(&path_owned).await.map_err(Into::into)
            } else {
                primary.backend.unlink(&path_owned).await.map_err(Into::into)
            }
        });

        match result {
            Ok(()) => {
                if let Some(ino) = self.inodes.lock().get_inode(&path) {
                    self.inodes.lock().remove(ino);
                }
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }
}
