use std::{cell::RefCell, collections::VecDeque, rc::Rc, sync::Arc};

use crate::fs::{FileSystem, FsResult, Stats};

type Task = Box<dyn FnOnce()>;

/// Single-threaded queue of completions.
///
/// Work is only ever run from [`EventLoop::run`], callbacks never fire
/// inline from the call that scheduled them.
#[derive(Clone, Default)]
pub struct EventLoop {
    queue: Rc<RefCell<VecDeque<Task>>>,
}
impl EventLoop {
    pub fn new() -> Self { Self::default() }

    pub fn defer(&self, task: impl FnOnce() + 'static) { self.queue.borrow_mut().push_back(Box::new(task)); }

    pub fn pending(&self) -> usize { self.queue.borrow().len() }

    /// Runs tasks until the queue is empty, including tasks queued while running.
    ///
    /// Returns the number of tasks run.
    pub fn run(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

/// Callback flavoured access to a filesystem, completing on an [`EventLoop`].
#[derive(Clone)]
pub struct AsyncFs {
    fs:     Arc<dyn FileSystem>,
    events: EventLoop,
}
impl AsyncFs {
    pub fn new(fs: Arc<dyn FileSystem>, events: EventLoop) -> Self { AsyncFs { fs, events } }

    pub fn events(&self) -> &EventLoop { &self.events }

    fn schedule<T: 'static>(
        &self, operation: impl FnOnce(&dyn FileSystem) -> T + 'static, callback: impl FnOnce(T) + 'static,
    ) {
        let fs = self.fs.clone();
        self.events.defer(move || callback(operation(fs.as_ref())));
    }

    pub fn stat(&self, path: &str, callback: impl FnOnce(FsResult<Stats>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.stat(&path), callback);
    }

    pub fn lstat(&self, path: &str, callback: impl FnOnce(FsResult<Stats>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.lstat(&path), callback);
    }

    pub fn exists(&self, path: &str, callback: impl FnOnce(bool) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.exists(&path), callback);
    }

    pub fn read_file(&self, path: &str, callback: impl FnOnce(FsResult<Vec<u8>>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.read_file(&path), callback);
    }

    pub fn write_file(&self, path: &str, data: Vec<u8>, callback: impl FnOnce(FsResult<()>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.write_file(&path, &data), callback);
    }

    pub fn append_file(&self, path: &str, data: Vec<u8>, callback: impl FnOnce(FsResult<()>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.append_file(&path, &data), callback);
    }

    pub fn read_dir(&self, path: &str, callback: impl FnOnce(FsResult<Vec<String>>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.read_dir(&path), callback);
    }

    pub fn mkdir(&self, path: &str, callback: impl FnOnce(FsResult<()>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.mkdir(&path), callback);
    }

    pub fn rmdir(&self, path: &str, callback: impl FnOnce(FsResult<()>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.rmdir(&path), callback);
    }

    pub fn unlink(&self, path: &str, callback: impl FnOnce(FsResult<()>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.unlink(&path), callback);
    }

    pub fn rename(&self, from: &str, to: &str, callback: impl FnOnce(FsResult<()>) + 'static) {
        let (from, to) = (from.to_owned(), to.to_owned());
        self.schedule(move |fs| fs.rename(&from, &to), callback);
    }

    pub fn copy_file(&self, from: &str, to: &str, callback: impl FnOnce(FsResult<()>) + 'static) {
        let (from, to) = (from.to_owned(), to.to_owned());
        self.schedule(move |fs| fs.copy_file(&from, &to), callback);
    }

    pub fn symlink(&self, target: &str, path: &str, callback: impl FnOnce(FsResult<()>) + 'static) {
        let (target, path) = (target.to_owned(), path.to_owned());
        self.schedule(move |fs| fs.symlink(&target, &path), callback);
    }

    pub fn read_link(&self, path: &str, callback: impl FnOnce(FsResult<String>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.read_link(&path), callback);
    }

    pub fn realpath(&self, path: &str, callback: impl FnOnce(FsResult<String>) + 'static) {
        let path = path.to_owned();
        self.schedule(move |fs| fs.realpath(&path), callback);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::fs::{ErrorCode, NativeFileSystem};

    #[test]
    fn runs_tasks_in_order() {
        let events = EventLoop::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            events.defer(move || seen.borrow_mut().push(i));
        }
        let nested = events.clone();
        let inner = seen.clone();
        events.defer(move || nested.defer(move || inner.borrow_mut().push(99)));
        assert_eq!(events.pending(), 4);
        assert_eq!(events.run(), 5);
        assert_eq!(*seen.borrow(), [0, 1, 2, 99]);
        assert_eq!(events.pending(), 0);
    }

    #[test]
    fn completes_only_when_driven() {
        let dir = tempfile::tempdir().unwrap();
        let fs = AsyncFs::new(Arc::new(NativeFileSystem::new(dir.path())), EventLoop::new());
        let done = Rc::new(Cell::new(0));

        let counter = done.clone();
        fs.write_file("/a.txt", b"hello".to_vec(), move |result| {
            result.unwrap();
            counter.set(counter.get() + 1);
        });
        assert_eq!(done.get(), 0);
        assert!(!dir.path().join("a.txt").exists());

        let counter = done.clone();
        fs.read_file("/a.txt", move |result| {
            assert_eq!(result.unwrap(), b"hello");
            counter.set(counter.get() + 1);
        });
        let counter = done.clone();
        fs.stat("/missing", move |result| {
            assert_eq!(result.unwrap_err().code, ErrorCode::ENOENT);
            counter.set(counter.get() + 1);
        });
        assert_eq!(fs.events().run(), 3);
        assert_eq!(done.get(), 3);
    }

    #[test]
    fn copies_and_removes_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("log.txt"), "a").unwrap();
        let fs = AsyncFs::new(Arc::new(NativeFileSystem::new(dir.path())), EventLoop::new());

        fs.append_file("/log.txt", b"b".to_vec(), |result| result.unwrap());
        fs.copy_file("/log.txt", "/copy.txt", |result| result.unwrap());
        fs.rmdir("/empty", |result| result.unwrap());
        assert_eq!(fs.events().pending(), 3);
        assert_eq!(std::fs::read_to_string(dir.path().join("log.txt")).unwrap(), "a");

        assert_eq!(fs.events().run(), 3);
        assert_eq!(std::fs::read_to_string(dir.path().join("copy.txt")).unwrap(), "ab");
        assert!(!dir.path().join("empty").exists());
    }

    #[cfg(unix)]
    #[test]
    fn links_complete_only_when_driven() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/a.js"), "").unwrap();
        let fs = AsyncFs::new(Arc::new(NativeFileSystem::new(dir.path())), EventLoop::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        fs.symlink("lib/a.js", "/link.js", |result| result.unwrap());
        assert!(std::fs::symlink_metadata(dir.path().join("link.js")).is_err());

        let links = seen.clone();
        fs.read_link("/link.js", move |result| links.borrow_mut().push(result.unwrap()));
        let links = seen.clone();
        fs.realpath("/link.js", move |result| links.borrow_mut().push(result.unwrap()));
        let counter = seen.clone();
        fs.lstat("/link.js", move |result| {
            assert!(result.unwrap().is_symlink());
            counter.borrow_mut().push("lstat".to_owned());
        });
        assert!(seen.borrow().is_empty());

        assert_eq!(fs.events().run(), 4);
        assert_eq!(*seen.borrow(), ["lib/a.js", "/lib/a.js", "lstat"]);
    }
}
