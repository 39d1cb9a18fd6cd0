//! An explicit pool of codec instances.
//!
//! Building a [`Codec`] (and warming its buffer) is not free, so call
//! sites that serialize repeatedly share a [`CodecPool`] instead of
//! constructing ad hoc instances. The guard owns its instance exclusively
//! until dropped, at which point the instance is reset and returned. The
//! pool is an explicit object handed around by the host; there is no
//! hidden global.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use crate::codec::{Codec, CodecBuilder};

/// A factory and free-list of [`Codec`] instances.
pub struct CodecPool {
    builder: CodecBuilder,
    idle: Mutex<Vec<Codec>>,
}

impl CodecPool {
    /// A pool building codecs from the given configuration.
    #[must_use]
    pub fn new(builder: CodecBuilder) -> Self {
        Self { builder, idle: Mutex::new(Vec::new()) }
    }

    /// Takes an idle instance, or builds a fresh one when none is idle.
    ///
    /// The guard dereferences to [`Codec`]; dropping it returns the
    /// instance to the pool.
    pub fn acquire(&self) -> PooledCodec<'_> {
        let codec = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| self.builder.build());
        PooledCodec { codec: Some(codec), pool: self }
    }

    /// Number of idle instances currently held.
    #[must_use]
    pub fn idle_count(&self) -> usize { self.idle.lock().len() }

    fn release(&self, mut codec: Codec) {
        codec.reset();
        self.idle.lock().push(codec);
    }
}

/// Exclusive ownership of a pooled codec for the guard's lifetime.
pub struct PooledCodec<'a> {
    codec: Option<Codec>,
    pool: &'a CodecPool,
}

impl Deref for PooledCodec<'_> {
    type Target = Codec;

    fn deref(&self) -> &Codec {
        self.codec.as_ref().expect("codec present until drop")
    }
}

impl DerefMut for PooledCodec<'_> {
    fn deref_mut(&mut self) -> &mut Codec {
        self.codec.as_mut().expect("codec present until drop")
    }
}

impl Drop for PooledCodec<'_> {
    fn drop(&mut self) {
        if let Some(codec) = self.codec.take() {
            self.pool.release(codec);
        }
    }
}
