//! Per-thread execution context.
//!
//! Each thread that wants scratch memory gets its own [`ThreadContext`],
//! stored in thread-local storage and dropped with the thread. Arenas are
//! `!Sync` and pools are never shared, so two threads allocate from
//! disjoint reservations without any locking.
//!
//! Code that prefers explicit plumbing can build a [`ScratchPool`] and pass
//! it around instead; nothing in the arena types depends on this module.
//!
//! A context's arenas allocate through a shared [`ContextMemory`] handle,
//! so the thread-local slot has one concrete type whatever provider the
//! context was built on. The pool, and every reservation it holds, is
//! released when the context is uninstalled and its last handle dropped,
//! or when the thread exits.

use std::cell::RefCell;
use std::rc::Rc;

use vmarena_core::{SystemMemory, VirtualMemory};

use crate::arena::ArenaId;
use crate::config::ScratchConfig;
use crate::error::ArenaError;
use crate::scratch::ScratchPool;
use crate::temp::Temp;

thread_local! {
    static CURRENT: RefCell<Option<Rc<ThreadContext>>> = const { RefCell::new(None) };
}

/// The provider handle shared by the arenas of a [`ThreadContext`].
pub type ContextMemory = Rc<dyn VirtualMemory>;

/// State owned by one thread: its scratch pool and a display name.
#[derive(Debug)]
pub struct ThreadContext {
    scratch: ScratchPool<ContextMemory>,
    name: RefCell<String>,
    main: bool,
}

impl ThreadContext {
    /// Create a context for a worker thread on the system provider.
    pub fn new(name: impl Into<String>, config: &ScratchConfig) -> Result<Self, ArenaError> {
        Self::with_memory(SystemMemory::new(), name, config)
    }

    /// Create a context whose scratch arenas allocate from `vm`.
    pub fn with_memory(
        vm: impl VirtualMemory + 'static,
        name: impl Into<String>,
        config: &ScratchConfig,
    ) -> Result<Self, ArenaError> {
        let vm: ContextMemory = Rc::new(vm);
        Ok(Self {
            scratch: ScratchPool::with_memory(vm, config)?,
            name: RefCell::new(name.into()),
            main: false,
        })
    }

    /// Create a context flagged as the main thread's.
    pub fn main(config: &ScratchConfig) -> Result<Self, ArenaError> {
        let mut ctx = Self::new("main", config)?;
        ctx.main = true;
        Ok(ctx)
    }

    /// Context for the calling thread with default settings, named after
    /// the thread.
    fn for_current_thread() -> Result<Self, ArenaError> {
        let config = ScratchConfig::default();
        let thread = std::thread::current();
        match thread.name() {
            Some("main") => Self::main(&config),
            Some(name) => Self::new(name, &config),
            None => Self::new(format!("{:?}", thread.id()), &config),
        }
    }

    /// The thread's scratch pool.
    pub fn scratch(&self) -> &ScratchPool<ContextMemory> {
        &self.scratch
    }

    /// The thread's display name.
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    /// Rename the thread for diagnostics.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.borrow_mut() = name.into();
    }

    /// Whether this context was created for the main thread.
    pub fn is_main_thread(&self) -> bool {
        self.main
    }
}

/// Make `ctx` the calling thread's context, returning the previous one.
pub fn install(ctx: ThreadContext) -> Option<Rc<ThreadContext>> {
    log::debug!("installing thread context {:?}", ctx.name());
    CURRENT.with(|current| current.borrow_mut().replace(Rc::new(ctx)))
}

/// Detach the calling thread's context.
///
/// The context is dropped once the last outstanding handle to it is.
pub fn uninstall() -> Option<Rc<ThreadContext>> {
    CURRENT.with(|current| current.borrow_mut().take())
}

/// The calling thread's context, created with defaults on first use.
pub fn current() -> Result<Rc<ThreadContext>, ArenaError> {
    CURRENT.with(|current| {
        if let Some(ctx) = current.borrow().as_ref() {
            return Ok(Rc::clone(ctx));
        }
        let ctx = Rc::new(ThreadContext::for_current_thread()?);
        log::debug!("created default thread context {:?}", ctx.name());
        *current.borrow_mut() = Some(Rc::clone(&ctx));
        Ok(ctx)
    })
}

/// Run `f` with a scratch borrow from the calling thread's pool.
///
/// `f` receives `None` when every member is in `exclude`. Fails only if a
/// default context has to be created and its arenas cannot be reserved.
pub fn try_with_scratch<R>(
    exclude: &[ArenaId],
    f: impl FnOnce(Option<Temp<'_, ContextMemory>>) -> R,
) -> Result<R, ArenaError> {
    let ctx = current()?;
    let scratch = ctx.scratch().acquire(exclude);
    Ok(f(scratch))
}

/// Infallible [`try_with_scratch`]: aborts the process if the thread's
/// context cannot be created.
pub fn with_scratch<R>(
    exclude: &[ArenaId],
    f: impl FnOnce(Option<Temp<'_, ContextMemory>>) -> R,
) -> R {
    match try_with_scratch(exclude, f) {
        Ok(result) => result,
        Err(err) => {
            log::error!("cannot create thread context: {err}");
            std::process::abort()
        }
    }
}
