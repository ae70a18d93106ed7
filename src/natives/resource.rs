//! `java.net.URL$ResourceInputStream` natives.
//!
//! `open` pins a resource's bytes under a numeric handle until `close`.
//! Handles are never reused, so a stale one is reported instead of reading
//! another resource.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::exception::{JavaResult, Throwable};
use crate::heap::ArrayBody;
use crate::thread::Thread;
use crate::value::{Tag, Value};

use super::Arguments;

#[derive(Debug, Default)]
struct Handles {
    next: i64,
    open: FxHashMap<i64, Arc<[u8]>>,
}

/// Open resources by handle.
#[derive(Debug, Default)]
pub struct ResourceHandles {
    inner: Mutex<Handles>,
}

impl ResourceHandles {
    /// Registers `data` and returns its handle (never 0).
    pub fn insert(&self, data: Arc<[u8]>) -> i64 {
        let mut inner = self.inner.lock();
        inner.next += 1;
        let handle = inner.next;
        inner.open.insert(handle, data);
        handle
    }

    pub fn get(&self, handle: i64) -> JavaResult<Arc<[u8]>> {
        self.inner
            .lock()
            .open
            .get(&handle)
            .cloned()
            .ok_or_else(|| Throwable::illegal_argument(format!("unknown resource handle {handle}")))
    }

    pub fn remove(&self, handle: i64) -> JavaResult<()> {
        match self.inner.lock().open.remove(&handle) {
            Some(_) => Ok(()),
            None => Err(Throwable::illegal_argument(format!("unknown resource handle {handle}"))),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `static long open(String path)`: 0 when there is no such resource.
pub fn open(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let path = vm.string_value(args.object(0)?)?;
    let handle = match vm.finder().find(&path) {
        Some(data) => vm.resources.insert(data),
        None => 0,
    };
    trace!(path = %path, handle, "opened resource");
    Ok(Value::Long(handle))
}

/// `static int read(long handle, int position)`: the byte at `position`, or
/// -1 past the end.
pub fn read(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let data = thread.vm().resources.get(args.long(0)?)?;
    let position = args.int(1)?;
    let byte = usize::try_from(position).ok().and_then(|p| data.get(p));
    Ok(Value::Int(byte.map_or(-1, |&b| i32::from(b))))
}

/// `static int read(long handle, int position, byte[] b, int offset, int
/// length)`: copies up to `length` bytes, returning the count or -1 at the
/// end of the resource.
pub fn read_into(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    let vm = thread.vm();
    let data = vm.resources.get(args.long(0)?)?;
    let position = args.int(1)?;
    let buffer = args.object(2)?;
    let offset = args.int(3)?;
    let length = args.int(4)?;

    let available = i64::try_from(data.len()).unwrap_or(i64::MAX) - i64::from(position);
    let count = i64::from(length).min(available);
    let (Ok(count), Ok(position)) = (usize::try_from(count), usize::try_from(position)) else {
        return Ok(Value::Int(-1));
    };

    let mut heap = vm.heap().write();
    let target = match heap.object_mut(buffer).as_array_mut() {
        Some(ArrayBody::Primitive { tag: Tag::Byte, data }) => data,
        _ => return Err(Throwable::illegal_argument("buffer is not a byte[]")),
    };
    let start = usize::try_from(offset)
        .ok()
        .filter(|&o| o.checked_add(count).is_some_and(|end| end <= target.len()))
        .ok_or_else(|| Throwable::array_index_out_of_bounds(i64::from(offset), target.len()))?;
    target[start..start + count].copy_from_slice(&data[position..position + count]);
    Ok(Value::Int(count as i32))
}

/// `static void close(long handle)`
pub fn close(thread: &mut Thread, args: &Arguments<'_>) -> JavaResult<Value> {
    thread.vm().resources.remove(args.long(0)?)?;
    Ok(Value::NULL)
}
