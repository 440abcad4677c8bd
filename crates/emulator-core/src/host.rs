//! Host collaborator surfaces: character console and module loader.
//!
//! Only the boundary contracts live in the core. Real hosts back the
//! console with a terminal and the loader with the platform's dynamic
//! linker; the reference [`VideoBuffer`] exists so the core and its tests
//! can exercise the surface without either.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use thiserror::Error;

/// Console width in character cells.
pub const CONSOLE_WIDTH: usize = 127;
/// Console height in character cells.
pub const CONSOLE_HEIGHT: usize = 31;

/// A cursor position on the character grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPosition {
    /// Column, `0..CONSOLE_WIDTH`.
    pub x: usize,
    /// Row, `0..CONSOLE_HEIGHT`.
    pub y: usize,
}

/// The character-cell display surface.
pub trait Console {
    /// Places a 32-bit code point at a cell.
    fn display_char(&self, x: usize, y: usize, codepoint: u32);
    /// Moves the cursor.
    fn set_cursor(&self, x: usize, y: usize);
    /// Reads the cursor position.
    fn get_cursor(&self) -> CursorPosition;
    /// Shows or hides the cursor.
    fn set_cursor_visibility(&self, visible: bool);
}

/// Reference console backing store: a mutex-guarded cell grid with an
/// atomic "video memory changed" flag the render thread polls at frame
/// boundaries.
#[derive(Debug)]
pub struct VideoBuffer {
    cells: Mutex<Vec<u32>>,
    cursor: Mutex<CursorPosition>,
    cursor_visible: AtomicBool,
    changed: AtomicBool,
}

impl Default for VideoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoBuffer {
    /// Creates a cleared grid.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(vec![0; CONSOLE_WIDTH * CONSOLE_HEIGHT]),
            cursor: Mutex::new(CursorPosition::default()),
            cursor_visible: AtomicBool::new(true),
            changed: AtomicBool::new(true),
        }
    }

    /// Reads a cell; out-of-range coordinates read zero.
    ///
    /// # Panics
    ///
    /// Panics if the grid lock is poisoned.
    #[must_use]
    pub fn cell(&self, x: usize, y: usize) -> u32 {
        if x >= CONSOLE_WIDTH || y >= CONSOLE_HEIGHT {
            return 0;
        }
        self.cells.lock().expect("video lock poisoned")[y * CONSOLE_WIDTH + x]
    }

    /// Takes the changed flag, clearing it.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::SeqCst)
    }

    /// True when the cursor is visible.
    #[must_use]
    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible.load(Ordering::SeqCst)
    }
}

impl Console for VideoBuffer {
    fn display_char(&self, x: usize, y: usize, codepoint: u32) {
        if x >= CONSOLE_WIDTH || y >= CONSOLE_HEIGHT {
            return;
        }
        self.cells.lock().expect("video lock poisoned")[y * CONSOLE_WIDTH + x] = codepoint;
        self.changed.store(true, Ordering::SeqCst);
    }

    fn set_cursor(&self, x: usize, y: usize) {
        let mut cursor = self.cursor.lock().expect("cursor lock poisoned");
        cursor.x = x.min(CONSOLE_WIDTH - 1);
        cursor.y = y.min(CONSOLE_HEIGHT - 1);
        self.changed.store(true, Ordering::SeqCst);
    }

    fn get_cursor(&self) -> CursorPosition {
        *self.cursor.lock().expect("cursor lock poisoned")
    }

    fn set_cursor_visibility(&self, visible: bool) {
        self.cursor_visible.store(visible, Ordering::SeqCst);
        self.changed.store(true, Ordering::SeqCst);
    }
}

/// The host could not open a native library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot load library: {0}")]
pub struct LibraryLoadError(pub String);

/// The host could not resolve a named symbol in a loaded library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot resolve function: {0}")]
pub struct ModuleResolutionError(pub String);

/// Capability contract for loading external code as a shared library.
///
/// Loader errors propagate to the host; they are never modeled as VM
/// interrupts.
pub trait ModuleLoader {
    /// Handle to an opened library.
    type Module;
    /// Handle to a resolved symbol of declared signature.
    type Symbol;

    /// Opens a native dynamic library by path.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryLoadError`] when the library cannot be opened.
    fn open(&self, path: &str) -> Result<Self::Module, LibraryLoadError>;

    /// Resolves a named symbol in an opened library.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleResolutionError`] when the symbol is absent or of
    /// the wrong shape.
    fn resolve(
        &self,
        module: &Self::Module,
        symbol: &str,
    ) -> Result<Self::Symbol, ModuleResolutionError>;
}

#[cfg(test)]
mod tests {
    use super::{Console, VideoBuffer, CONSOLE_HEIGHT, CONSOLE_WIDTH};

    #[test]
    fn grid_dimensions_match_the_terminal_contract() {
        assert_eq!(CONSOLE_WIDTH, 127);
        assert_eq!(CONSOLE_HEIGHT, 31);
    }

    #[test]
    fn display_char_sets_cell_and_changed_flag() {
        let buffer = VideoBuffer::new();
        assert!(buffer.take_changed());
        assert!(!buffer.take_changed());

        buffer.display_char(3, 7, u32::from('A'));
        assert_eq!(buffer.cell(3, 7), u32::from('A'));
        assert!(buffer.take_changed());
    }

    #[test]
    fn out_of_range_cells_are_ignored() {
        let buffer = VideoBuffer::new();
        buffer.take_changed();
        buffer.display_char(CONSOLE_WIDTH, 0, 1);
        buffer.display_char(0, CONSOLE_HEIGHT, 1);
        assert!(!buffer.take_changed());
    }

    #[test]
    fn cursor_roundtrips_and_clamps() {
        let buffer = VideoBuffer::new();
        buffer.set_cursor(5, 9);
        let cursor = buffer.get_cursor();
        assert_eq!((cursor.x, cursor.y), (5, 9));

        buffer.set_cursor(1000, 1000);
        let cursor = buffer.get_cursor();
        assert_eq!((cursor.x, cursor.y), (CONSOLE_WIDTH - 1, CONSOLE_HEIGHT - 1));

        buffer.set_cursor_visibility(false);
        assert!(!buffer.cursor_visible());
    }
}
