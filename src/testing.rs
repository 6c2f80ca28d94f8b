//! Host-side stand-ins for the kernel's collaborators.
//!
//! User memory is real host memory: each region is page-aligned, its pages
//! are registered in a [`PageSet`], and it is followed by one page that is
//! never registered, so running off the end of a region always faults.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use spin::Mutex;

use crate::config::KernelConfig;
use crate::drivers::Console;
use crate::fs::{FileSystem, FsGuard, OpenFile};
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, PageAccess, VirtAddr, PAGE_SIZE};
use crate::process::{Fd, LoadError, LoadedImage, Process, ProgramLoader, Scheduler, SpawnError};
use crate::trap::{self, RegisterFrame, TrapOutcome};

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RamFsState {
    files: BTreeMap<String, Arc<Mutex<Vec<u8>>>>,
    open_handles: usize,
    /// Duplicates still allowed before `duplicate` starts failing.
    duplicates_left: Option<usize>,
}

/// In-memory filesystem. Clones share the same files.
#[derive(Clone, Default)]
pub struct RamFs {
    state: Arc<Mutex<RamFsState>>,
}

impl RamFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite `name` with `bytes`.
    pub fn insert(&self, name: &str, bytes: &[u8]) {
        self.state
            .lock()
            .files
            .insert(String::from(name), Arc::new(Mutex::new(bytes.to_vec())));
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let file = state.files.get(name)?;
        let bytes = file.lock().clone();
        Some(bytes)
    }

    /// Handles opened or duplicated and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.state.lock().open_handles
    }

    /// Let `n` more duplicates succeed, then fail every one after.
    pub fn fail_duplicates_after(&self, n: usize) {
        self.state.lock().duplicates_left = Some(n);
    }
}

impl FileSystem for RamFs {
    fn create(&mut self, name: &str, initial_size: u32) -> bool {
        let mut state = self.state.lock();
        if name.is_empty() || state.files.contains_key(name) {
            return false;
        }
        let data = Arc::new(Mutex::new(vec![0; initial_size as usize]));
        state.files.insert(String::from(name), data);
        true
    }

    fn remove(&mut self, name: &str) -> bool {
        self.state.lock().files.remove(name).is_some()
    }

    fn open(&mut self, name: &str) -> Option<Box<dyn OpenFile>> {
        let mut state = self.state.lock();
        let data = state.files.get(name)?.clone();
        state.open_handles += 1;
        Some(Box::new(RamFile {
            data,
            pos: 0,
            fs: self.state.clone(),
        }))
    }
}

struct RamFile {
    data: Arc<Mutex<Vec<u8>>>,
    pos: u32,
    fs: Arc<Mutex<RamFsState>>,
}

impl OpenFile for RamFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let data = self.data.lock();
        let start = (self.pos as usize).min(data.len());
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        self.pos += count as u32;
        count
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        // Files don't grow
        let mut data = self.data.lock();
        let start = (self.pos as usize).min(data.len());
        let count = buf.len().min(data.len() - start);
        data[start..start + count].copy_from_slice(&buf[..count]);
        self.pos += count as u32;
        count
    }

    fn length(&self) -> u32 {
        self.data.lock().len() as u32
    }

    fn seek(&mut self, pos: u32) {
        self.pos = pos;
    }

    fn tell(&self) -> u32 {
        self.pos
    }

    fn duplicate(&self) -> Option<Box<dyn OpenFile>> {
        let mut state = self.fs.lock();
        if let Some(left) = state.duplicates_left.as_mut() {
            if *left == 0 {
                return None;
            }
            *left -= 1;
        }
        state.open_handles += 1;
        Some(Box::new(RamFile {
            data: self.data.clone(),
            pos: self.pos,
            fs: self.fs.clone(),
        }))
    }

    fn close(self: Box<Self>) {
        self.fs.lock().open_handles -= 1;
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Address space backed by a set of registered pages. Clones share the set;
/// `duplicate` copies it.
#[derive(Clone, Default)]
pub struct PageSet {
    pages: Arc<Mutex<BTreeMap<usize, PageAccess>>>,
    refuse_duplicates: Arc<Mutex<bool>>,
}

impl PageSet {
    /// Make every later `duplicate` fail, as if out of memory.
    pub fn fail_duplicates(&self) {
        *self.refuse_duplicates.lock() = true;
    }

    fn register(&self, page: usize, access: PageAccess) {
        self.pages
            .lock()
            .insert(VirtAddr::new_unchecked(page).page_number(), access);
    }
}

impl AddressSpace for PageSet {
    fn page_access(&self, page: VirtAddr) -> Option<PageAccess> {
        self.pages.lock().get(&page.page_number()).copied()
    }

    fn duplicate(&self) -> Option<Box<dyn AddressSpace>> {
        if *self.refuse_duplicates.lock() {
            return None;
        }
        let pages = self.pages.lock().clone();
        Some(Box::new(PageSet {
            pages: Arc::new(Mutex::new(pages)),
            refuse_duplicates: Arc::default(),
        }))
    }
}

/// Host allocations standing in for user memory.
pub struct UserMemory {
    space: PageSet,
    regions: Vec<(*mut u8, Layout)>,
}

impl UserMemory {
    pub fn new(space: PageSet) -> Self {
        Self {
            space,
            regions: Vec::new(),
        }
    }

    /// Allocate `pages` zeroed pages plus an unregistered guard page.
    fn alloc(&mut self, pages: usize) -> usize {
        let layout = Layout::from_size_align((pages + 1) * PAGE_SIZE, PAGE_SIZE).unwrap();
        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        self.regions.push((ptr, layout));
        ptr as usize
    }

    /// Map one zeroed page with `access`.
    pub fn map_page(&mut self, access: PageAccess) -> usize {
        let base = self.alloc(1);
        self.space.register(base, access);
        base
    }

    /// Map `bytes` at the start of fresh pages.
    pub fn map_bytes(&mut self, bytes: &[u8], access: PageAccess) -> usize {
        let pages = bytes.len().div_ceil(PAGE_SIZE).max(1);
        let base = self.alloc(pages);
        for page in 0..pages {
            self.space.register(base + page * PAGE_SIZE, access);
        }
        self.write(base, bytes);
        base
    }

    /// Map `s` followed by a NUL terminator, read-only.
    pub fn map_str(&mut self, s: &str) -> usize {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.map_bytes(&bytes, PageAccess::USER)
    }

    /// An address nothing is mapped at.
    pub fn unmapped(&mut self) -> usize {
        self.alloc(1)
    }

    pub fn write(&self, addr: usize, bytes: &[u8]) {
        self.assert_owned(addr, bytes.len());
        // SAFETY: the range lies inside one of our allocations
        unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len()) }
    }

    pub fn read(&self, addr: usize, len: usize) -> Vec<u8> {
        self.assert_owned(addr, len);
        // SAFETY: the range lies inside one of our allocations
        unsafe { core::slice::from_raw_parts(addr as *const u8, len) }.to_vec()
    }

    fn assert_owned(&self, addr: usize, len: usize) {
        let owned = self.regions.iter().any(|&(ptr, layout)| {
            let start = ptr as usize;
            addr >= start && addr + len <= start + layout.size()
        });
        assert!(owned, "{addr:#x}+{len} is not test memory");
    }
}

impl Drop for UserMemory {
    fn drop(&mut self) {
        for &(ptr, layout) in &self.regions {
            // SAFETY: allocated in `alloc` with this layout
            unsafe { dealloc(ptr, layout) }
        }
    }
}

// ---------------------------------------------------------------------------
// Console, scheduler, loader
// ---------------------------------------------------------------------------

/// Console with scripted input and captured output. An exhausted script
/// reads as NUL.
#[derive(Default)]
pub struct ScriptConsole {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
}

impl ScriptConsole {
    pub fn feed(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }

    pub fn output_str(&self) -> String {
        String::from_utf8(self.output()).unwrap()
    }
}

impl Console for ScriptConsole {
    fn put_bytes(&self, bytes: &[u8]) {
        self.output.lock().extend_from_slice(bytes);
    }

    fn get_byte(&self) -> u8 {
        self.input.lock().pop_front().unwrap_or(0)
    }
}

/// Records started children instead of running them.
#[derive(Default)]
pub struct RecordingScheduler {
    started: Mutex<VecDeque<(Arc<Process>, RegisterFrame)>>,
    refuse: Mutex<bool>,
    powered_off: Mutex<bool>,
}

impl RecordingScheduler {
    pub fn take_started(&self) -> Option<(Arc<Process>, RegisterFrame)> {
        self.started.lock().pop_front()
    }

    /// Make the next `start` fail.
    pub fn refuse_next(&self) {
        *self.refuse.lock() = true;
    }

    pub fn is_powered_off(&self) -> bool {
        *self.powered_off.lock()
    }
}

impl Scheduler for RecordingScheduler {
    fn start(&self, child: Arc<Process>, frame: RegisterFrame) -> Result<(), SpawnError> {
        if core::mem::take(&mut *self.refuse.lock()) {
            return Err(SpawnError);
        }
        self.started.lock().push_back((child, frame));
        Ok(())
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }

    fn power_off(&self) {
        *self.powered_off.lock() = true;
    }
}

/// Loads programs registered with [`StaticLoader::install`]; the file must
/// also exist in the filesystem.
pub struct StaticLoader {
    space: PageSet,
    programs: Mutex<BTreeMap<String, (u64, u64)>>,
}

impl StaticLoader {
    pub fn new(space: PageSet) -> Self {
        Self {
            space,
            programs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn install(&self, name: &str, entry: u64, stack_top: u64) {
        self.programs
            .lock()
            .insert(String::from(name), (entry, stack_top));
    }
}

impl ProgramLoader for StaticLoader {
    fn load(&self, fs: &mut FsGuard<'_>, path: &str) -> Result<LoadedImage, LoadError> {
        let file = fs.open(path).ok_or(LoadError::NotFound)?;
        fs.close(file);
        let (entry, stack_top) = *self
            .programs
            .lock()
            .get(path)
            .ok_or(LoadError::InvalidImage)?;
        Ok(LoadedImage {
            space: Box::new(self.space.clone()),
            entry,
            stack_top,
        })
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// A kernel wired to host stand-ins.
pub struct TestEnv {
    pub kernel: Arc<Kernel>,
    pub ramfs: RamFs,
    pub console: Arc<ScriptConsole>,
    pub scheduler: Arc<RecordingScheduler>,
    pub loader: Arc<StaticLoader>,
    pub memory: UserMemory,
    space: PageSet,
    stack: usize,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        let space = PageSet::default();
        let mut memory = UserMemory::new(space.clone());
        let stack = memory.map_page(PageAccess::USER_DATA);

        let ramfs = RamFs::new();
        let console = Arc::new(ScriptConsole::default());
        let scheduler = Arc::new(RecordingScheduler::default());
        let loader = Arc::new(StaticLoader::new(space.clone()));
        let kernel = Arc::new(Kernel::new(
            config,
            Box::new(ramfs.clone()),
            console.clone(),
            scheduler.clone(),
            loader.clone(),
        ));

        Self {
            kernel,
            ramfs,
            console,
            scheduler,
            loader,
            memory,
            space,
            stack,
        }
    }

    /// A parentless process sharing the environment's mappings.
    pub fn spawn_initial(&self, name: &str) -> Arc<Process> {
        self.kernel.spawn_initial(name, Box::new(self.space.clone()))
    }

    /// Make address-space copies for fork fail.
    pub fn fail_space_duplicates(&self) {
        self.space.fail_duplicates();
    }

    /// A mapped user stack pointer.
    pub fn stack_top(&self) -> u64 {
        (self.stack + PAGE_SIZE - 64) as u64
    }

    pub fn create_file(&self, name: &str, bytes: &[u8]) {
        self.ramfs.insert(name, bytes);
    }

    /// Open `name` straight into `process`'s table.
    pub fn open_in(&self, process: &Process, name: &str) -> Fd {
        let mut fs = self.kernel.fs().lock();
        let file = fs.open(name).unwrap();
        process.fds.lock().allocate(file).ok().unwrap()
    }

    /// Make `name` an executable.
    pub fn install_program(&self, name: &str, entry: u64, stack_top: u64) {
        self.ramfs.insert(name, b"\x7fELF");
        self.loader.install(name, entry, stack_top);
    }

    /// Trap into the kernel with `number` and `args`. Returns the outcome
    /// and the result register.
    pub fn syscall(&self, process: &Arc<Process>, number: u64, args: &[u64]) -> (TrapOutcome, i64) {
        let mut frame = RegisterFrame::syscall(number, args, self.stack_top());
        let outcome = trap::handle_syscall_trap(&self.kernel, process, &mut frame);
        (outcome, frame.return_value())
    }
}
