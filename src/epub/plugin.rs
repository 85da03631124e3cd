//! Hooks run by the reader and writer.

use crate::book::{Book, Item};

/// Error type returned by hooks; surfaced unchanged as [`Error::Hook`](crate::Error::Hook).
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Callbacks around reading and writing. Every method defaults to a no-op, so an
/// implementation only overrides the stages it cares about.
pub trait Plugin {
    /// Called once before anything is written.
    fn before_write(&mut self, _book: &mut Book) -> Result<(), HookError> {
        Ok(())
    }

    /// Called for every document item, in registration order, after [`Plugin::before_write`].
    ///
    /// `book` is the book as it stood before this item's hook ran; changes go
    /// through `item`.
    fn before_write_document(&mut self, _book: &Book, _item: &mut Item) -> Result<(), HookError> {
        Ok(())
    }

    /// Called once the book has been reconstructed.
    fn after_read(&mut self, _book: &mut Book) -> Result<(), HookError> {
        Ok(())
    }

    /// Called for every document item after [`Plugin::after_read`].
    fn after_read_document(&mut self, _book: &Book, _item: &mut Item) -> Result<(), HookError> {
        Ok(())
    }
}

/// Run the whole-book hook, then the per-document hook over every document item.
///
/// Each document is handed to the hook detached from the book and put back
/// afterwards, so the hook can look at the rest of the book while editing it.
pub(crate) fn run_hooks<B, D>(
    plugins: &mut [Box<dyn Plugin>],
    book: &mut Book,
    mut whole: B,
    mut per_document: D,
) -> crate::Result<()>
where
    B: FnMut(&mut dyn Plugin, &mut Book) -> Result<(), HookError>,
    D: FnMut(&mut dyn Plugin, &Book, &mut Item) -> Result<(), HookError>,
{
    for plugin in plugins.iter_mut() {
        whole(plugin.as_mut(), book).map_err(crate::Error::Hook)?;
    }
    for plugin in plugins.iter_mut() {
        for index in 0..book.items().len() {
            if !book.items()[index].is_document() {
                continue;
            }
            let mut item = book.items()[index].clone();
            per_document(plugin.as_mut(), book, &mut item).map_err(crate::Error::Hook)?;
            book.replace_item_at(index, item);
        }
    }
    Ok(())
}
