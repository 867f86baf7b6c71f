//! Static mapping between configuration keywords and kernel event bits.
//!
//! The keyword set is closed: `access`, `attrib`, `close`, `close_write`,
//! `close_nowrite`, `create`, `delete`, `delete_self`, `modify`, `move`,
//! `move_self`, `move_from`, `move_to`, `open`. Unknown keywords are
//! reported and ignored.

use bitflags::bitflags;

bitflags! {
    /// inotify event mask bits, matching the kernel values exactly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        /// File was accessed.
        const ACCESS = libc::IN_ACCESS;
        /// File was modified.
        const MODIFY = libc::IN_MODIFY;
        /// Metadata (permissions, timestamps, ownership) changed.
        const ATTRIB = libc::IN_ATTRIB;
        /// File opened for writing was closed.
        const CLOSE_WRITE = libc::IN_CLOSE_WRITE;
        /// File or directory not opened for writing was closed.
        const CLOSE_NOWRITE = libc::IN_CLOSE_NOWRITE;
        /// File or directory was opened.
        const OPEN = libc::IN_OPEN;
        /// File moved out of a watched directory.
        const MOVED_FROM = libc::IN_MOVED_FROM;
        /// File moved into a watched directory.
        const MOVED_TO = libc::IN_MOVED_TO;
        /// File or directory created inside a watched directory.
        const CREATE = libc::IN_CREATE;
        /// File or directory deleted from a watched directory.
        const DELETE = libc::IN_DELETE;
        /// The watched object itself was deleted.
        const DELETE_SELF = libc::IN_DELETE_SELF;
        /// The watched object itself was moved.
        const MOVE_SELF = libc::IN_MOVE_SELF;

        /// `CLOSE_WRITE | CLOSE_NOWRITE`.
        const CLOSE = libc::IN_CLOSE;
        /// `MOVED_FROM | MOVED_TO`.
        const MOVE = libc::IN_MOVE;

        // Flags set by the kernel on delivered events.
        /// Watch was removed, explicitly or automatically.
        const IGNORED = libc::IN_IGNORED;
        /// Subject of the event is a directory.
        const ISDIR = libc::IN_ISDIR;
        /// Event queue overflowed.
        const Q_OVERFLOW = libc::IN_Q_OVERFLOW;
        /// Filesystem containing the watched object was unmounted.
        const UNMOUNT = libc::IN_UNMOUNT;

        // Flags accepted only at registration time.
        /// Register only if the path is a directory.
        const ONLYDIR = libc::IN_ONLYDIR;
    }
}

/// One entry of the closed keyword table.
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo {
    /// Kernel constant name, e.g. `IN_CREATE`.
    pub name: &'static str,
    /// Configuration keyword, e.g. `create`.
    pub key: &'static str,
    /// Mask bits the keyword maps to.
    pub mask: EventMask,
    /// Short human description.
    pub description: &'static str,
}

/// The closed keyword table, in kernel bit order.
pub const FIELDS: &[FieldInfo] = &[
    FieldInfo {
        name: "IN_ACCESS",
        key: "access",
        mask: EventMask::ACCESS,
        description: "File was accessed.",
    },
    FieldInfo {
        name: "IN_MODIFY",
        key: "modify",
        mask: EventMask::MODIFY,
        description: "File was modified.",
    },
    FieldInfo {
        name: "IN_ATTRIB",
        key: "attrib",
        mask: EventMask::ATTRIB,
        description: "Metadata, permissions, timestamps, ownership, etc, changes.",
    },
    FieldInfo {
        name: "IN_CLOSE_WRITE",
        key: "close_write",
        mask: EventMask::CLOSE_WRITE,
        description: "File opened for writing was closed.",
    },
    FieldInfo {
        name: "IN_CLOSE_NOWRITE",
        key: "close_nowrite",
        mask: EventMask::CLOSE_NOWRITE,
        description: "File or directory not opened for writing was closed.",
    },
    FieldInfo {
        name: "IN_CLOSE",
        key: "close",
        mask: EventMask::CLOSE,
        description: "IN_CLOSE_WRITE | IN_CLOSE_NOWRITE",
    },
    FieldInfo {
        name: "IN_OPEN",
        key: "open",
        mask: EventMask::OPEN,
        description: "File or directory was opened.",
    },
    FieldInfo {
        name: "IN_MOVED_FROM",
        key: "move_from",
        mask: EventMask::MOVED_FROM,
        description: "Generated for the directory containing the old filename when a file is renamed.",
    },
    FieldInfo {
        name: "IN_MOVED_TO",
        key: "move_to",
        mask: EventMask::MOVED_TO,
        description: "Generated for the directory containing the new filename when a file is renamed.",
    },
    FieldInfo {
        name: "IN_MOVE",
        key: "move",
        mask: EventMask::MOVE,
        description: "IN_MOVED_FROM | IN_MOVED_TO.",
    },
    FieldInfo {
        name: "IN_CREATE",
        key: "create",
        mask: EventMask::CREATE,
        description: "File/directory created in watched directory.",
    },
    FieldInfo {
        name: "IN_DELETE",
        key: "delete",
        mask: EventMask::DELETE,
        description: "File/directory deleted from watched directory.",
    },
    FieldInfo {
        name: "IN_DELETE_SELF",
        key: "delete_self",
        mask: EventMask::DELETE_SELF,
        description: "Watched file/directory was itself deleted.",
    },
    FieldInfo {
        name: "IN_MOVE_SELF",
        key: "move_self",
        mask: EventMask::MOVE_SELF,
        description: "Watched file/directory was itself moved.",
    },
];

/// Look up the mask bits for a single configuration keyword.
#[must_use]
pub fn keyword_to_mask(keyword: &str) -> Option<EventMask> {
    FIELDS
        .iter()
        .find(|f| f.key == keyword)
        .map(|f| f.mask)
}

/// OR together the mask bits of every recognized keyword.
///
/// Unrecognized keywords are reported on the diagnostic stream and
/// otherwise ignored; an all-unknown (or empty) list yields an empty mask.
#[must_use]
pub fn keywords_to_mask(keywords: &[String]) -> EventMask {
    let mut mask = EventMask::empty();
    for keyword in keywords {
        match keyword_to_mask(keyword) {
            Some(bits) => mask |= bits,
            None => tracing::warn!(keyword = %keyword, "unknown event keyword ignored"),
        }
    }
    mask
}
