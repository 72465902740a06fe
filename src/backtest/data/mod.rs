//! Chunked, cached access to historical event arrays, backed by on-disk NPY/NPZ files or
//! data already held in memory.

mod reader;

pub use reader::{Cache, DataPreprocess, DataSource, FeedLatencyAdjustment, NullPreprocessor, Reader};

use std::io::Error as IoError;
use std::rc::Rc;

/// A reference-counted, clone-cheap view over a loaded row array. Sharing the same
/// underlying buffer between the local and exchange readers of one asset avoids parsing the
/// same file twice.
#[derive(Clone, Debug)]
pub struct Data<D> {
    rows: Rc<Vec<D>>,
}

impl<D> Data<D> {
    pub fn from_vec(rows: Vec<D>) -> Self {
        Self { rows: Rc::new(rows) }
    }

    pub fn empty() -> Self {
        Self { rows: Rc::new(Vec::new()) }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn as_slice(&self) -> &[D] {
        &self.rows
    }

    /// Identity equality used by the cache to tell two `Data` handles apart even when their
    /// contents happen to be equal, mirroring a reference-count check.
    pub fn ptr_eq(&self, other: &Data<D>) -> bool {
        Rc::ptr_eq(&self.rows, &other.rows)
    }
}

impl<D> std::ops::Index<usize> for Data<D> {
    type Output = D;
    fn index(&self, i: usize) -> &D {
        &self.rows[i]
    }
}

pub type IoResult<T> = Result<T, IoError>;
