//! `FileStream`/`DirectoryStream` (C7 supplement): host objects for scripts
//! that need to read or write incrementally instead of through `FS`'s
//! whole-file calls.
//!
//! Both wrap their native state in the bridge's [`HostRegistry`]: a wrapper
//! object's methods close over a [`HostHandle`] rather than the value
//! itself, so `dispose()` can drop the entry and every later call fails
//! loudly instead of aliasing a different object (see
//! [`crate::js::registry`]'s doc comment).
//!
//! `DirectoryStream` takes an eager snapshot of its directory at
//! construction/`rewind()` time rather than reading live, matching the
//! original engine's `vector`-based listing.
//!
//! Both constructors are registered directly against `boa_engine` (see
//! [`crate::dsl::tool`] for why): each call needs to build a fresh object
//! with its own bound methods, which the engine-agnostic `NativeCallback`
//! can't do from inside a closure.

use crate::fs::FileIo;
use crate::js::{cell_error_to_js, js_error_to_cell, Bridge, HostHandle, HostRegistry};
use boa_engine::object::builtins::JsArray;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{js_string, Context, JsNativeError, JsObject, JsValue, NativeFunction};
use cell_schema::CellError;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write as _};
use std::rc::Rc;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
    Update,
}

impl Mode {
    fn parse(s: &str) -> Result<Self, CellError> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "update" => Ok(Self::Update),
            other => Err(CellError::ToolFailure(format!("FileStream: unknown mode '{other}'"))),
        }
    }
}

struct NativeFileStream {
    file: File,
}

struct NativeDirectoryStream {
    entries: Vec<String>,
    position: usize,
}

fn io_err(path: &str, source: std::io::Error) -> CellError {
    CellError::Io {
        path: path.to_string(),
        source,
    }
}

fn disposed(kind: &str) -> CellError {
    CellError::ToolFailure(format!("{kind} has already been disposed"))
}

/// Register `FileStream` and `DirectoryStream` as globals.
///
/// # Errors
///
/// Returns an error if either constructor can't be wired onto the global
/// object.
pub fn install(bridge: &mut Bridge, io: Rc<FileIo>, registry: Rc<RefCell<HostRegistry>>) -> Result<(), CellError> {
    install_file_stream(bridge, Rc::clone(&io), Rc::clone(&registry))?;
    install_directory_stream(bridge, io, registry)
}

fn install_file_stream(
    bridge: &mut Bridge,
    io: Rc<FileIo>,
    registry: Rc<RefCell<HostRegistry>>,
) -> Result<(), CellError> {
    let context = bridge.context_mut();

    let ctor = NativeFunction::from_closure(move |_this, args, context| {
        let path = args
            .first()
            .and_then(JsValue::as_string)
            .map(|s| s.to_std_string_escaped())
            .ok_or_else(|| JsNativeError::typ().with_message("FileStream: path required").into())?;
        let mode_arg = args
            .get(1)
            .and_then(JsValue::as_string)
            .map(|s| s.to_std_string_escaped())
            .unwrap_or_else(|| "read".to_string());
        let mode = Mode::parse(&mode_arg).map_err(cell_error_to_js)?;

        let real_path = io
            .sandbox()
            .resolve(&path)
            .map_err(|e| cell_error_to_js(CellError::SandboxViolation(e.to_string())))?;

        if matches!(mode, Mode::Write) {
            if let Some(parent) = real_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| cell_error_to_js(io_err(&path, e)))?;
            }
        }

        let file = match mode {
            Mode::Read => File::open(&real_path),
            Mode::Write => File::create(&real_path),
            Mode::Update => OpenOptions::new().read(true).write(true).create(true).open(&real_path),
        }
        .map_err(|e| cell_error_to_js(io_err(&path, e)))?;

        let handle = registry.borrow_mut().insert(NativeFileStream { file });
        build_file_stream_object(context, Rc::clone(&registry), handle).map(JsValue::from)
    });

    let function = FunctionObjectBuilder::new(context.realm(), ctor)
        .name(js_string!("FileStream"))
        .length(2)
        .build();

    let global = context.global_object();
    global
        .set(js_string!("FileStream"), function, true, context)
        .map_err(|e| js_error_to_cell("<global>", &e))
}

fn build_file_stream_object(
    context: &mut Context,
    registry: Rc<RefCell<HostRegistry>>,
    handle: HostHandle,
) -> Result<JsObject, CellError> {
    let object = JsObject::with_null_proto();

    {
        let registry = Rc::clone(&registry);
        let read = NativeFunction::from_closure(move |_this, args, _context| {
            let count = args.first().and_then(JsValue::as_number).map_or(4096, |n| n as usize);
            let mut registry = registry.borrow_mut();
            let stream = registry
                .get_mut::<NativeFileStream>(handle)
                .ok_or_else(|| disposed("FileStream"))
                .map_err(cell_error_to_js)?;
            let mut buf = vec![0_u8; count];
            let read = stream
                .file
                .read(&mut buf)
                .map_err(|e| cell_error_to_js(io_err("<stream>", e)))?;
            buf.truncate(read);
            Ok(JsValue::from(js_string!(String::from_utf8_lossy(&buf).into_owned())))
        });
        register_method(context, &object, "read", 1, read)?;
    }

    {
        let registry = Rc::clone(&registry);
        let write = NativeFunction::from_closure(move |_this, args, context| {
            let text = args
                .first()
                .cloned()
                .unwrap_or_else(JsValue::undefined)
                .to_string(context)?
                .to_std_string_escaped();
            let mut registry = registry.borrow_mut();
            let stream = registry
                .get_mut::<NativeFileStream>(handle)
                .ok_or_else(|| disposed("FileStream"))
                .map_err(cell_error_to_js)?;
            stream
                .file
                .write_all(text.as_bytes())
                .map_err(|e| cell_error_to_js(io_err("<stream>", e)))?;
            Ok(JsValue::undefined())
        });
        register_method(context, &object, "write", 1, write)?;
    }

    {
        let registry = Rc::clone(&registry);
        let file_size = NativeFunction::from_closure(move |_this, _args, _context| {
            let mut registry = registry.borrow_mut();
            let stream = registry
                .get_mut::<NativeFileStream>(handle)
                .ok_or_else(|| disposed("FileStream"))
                .map_err(cell_error_to_js)?;
            let len = stream
                .file
                .metadata()
                .map_err(|e| cell_error_to_js(io_err("<stream>", e)))?
                .len();
            Ok(JsValue::from(len as f64))
        });
        register_method(context, &object, "fileSize", 0, file_size)?;
    }

    {
        let registry = Rc::clone(&registry);
        let position = NativeFunction::from_closure(move |_this, _args, _context| {
            let mut registry = registry.borrow_mut();
            let stream = registry
                .get_mut::<NativeFileStream>(handle)
                .ok_or_else(|| disposed("FileStream"))
                .map_err(cell_error_to_js)?;
            let pos = stream
                .file
                .stream_position()
                .map_err(|e| cell_error_to_js(io_err("<stream>", e)))?;
            Ok(JsValue::from(pos as f64))
        });
        register_method(context, &object, "position", 0, position)?;
    }

    {
        let registry = Rc::clone(&registry);
        let dispose = NativeFunction::from_closure(move |_this, _args, _context| {
            if let Some(stream) = registry.borrow_mut().get_mut::<NativeFileStream>(handle) {
                let _ = stream.file.flush();
            }
            registry.borrow_mut().remove(handle);
            Ok(JsValue::undefined())
        });
        register_method(context, &object, "dispose", 0, dispose)?;
    }

    Ok(object)
}

fn register_method(
    context: &mut Context,
    object: &JsObject,
    name: &'static str,
    arity: u32,
    native: NativeFunction,
) -> Result<(), CellError> {
    let function = FunctionObjectBuilder::new(context.realm(), native)
        .name(js_string!(name))
        .length(arity)
        .build();
    object
        .set(js_string!(name), function, true, context)
        .map_err(|e| js_error_to_cell("<host object>", &e))
}

fn install_directory_stream(
    bridge: &mut Bridge,
    io: Rc<FileIo>,
    registry: Rc<RefCell<HostRegistry>>,
) -> Result<(), CellError> {
    let context = bridge.context_mut();

    let ctor = NativeFunction::from_closure(move |_this, args, context| {
        let path = args
            .first()
            .and_then(JsValue::as_string)
            .map(|s| s.to_std_string_escaped())
            .ok_or_else(|| JsNativeError::typ().with_message("DirectoryStream: path required").into())?;

        let entries = io
            .read_dir(&path)
            .map_err(cell_error_to_js)?
            .into_iter()
            .map(|e| e.name)
            .collect::<Vec<_>>();

        let handle = registry.borrow_mut().insert(NativeDirectoryStream { entries, position: 0 });
        build_directory_stream_object(context, Rc::clone(&registry), handle).map(JsValue::from)
    });

    let function = FunctionObjectBuilder::new(context.realm(), ctor)
        .name(js_string!("DirectoryStream"))
        .length(1)
        .build();

    let global = context.global_object();
    global
        .set(js_string!("DirectoryStream"), function, true, context)
        .map_err(|e| js_error_to_cell("<global>", &e))
}

fn build_directory_stream_object(
    context: &mut Context,
    registry: Rc<RefCell<HostRegistry>>,
    handle: HostHandle,
) -> Result<JsObject, CellError> {
    let object = JsObject::with_null_proto();

    {
        let registry = Rc::clone(&registry);
        let next = NativeFunction::from_closure(move |_this, _args, _context| {
            let mut registry = registry.borrow_mut();
            let stream = registry
                .get_mut::<NativeDirectoryStream>(handle)
                .ok_or_else(|| disposed("DirectoryStream"))
                .map_err(cell_error_to_js)?;
            if stream.position >= stream.entries.len() {
                return Ok(JsValue::null());
            }
            let value = JsValue::from(js_string!(stream.entries[stream.position].as_str()));
            stream.position += 1;
            Ok(value)
        });
        register_method(context, &object, "next", 0, next)?;
    }

    {
        let registry = Rc::clone(&registry);
        let rewind = NativeFunction::from_closure(move |_this, _args, _context| {
            let mut registry = registry.borrow_mut();
            let stream = registry
                .get_mut::<NativeDirectoryStream>(handle)
                .ok_or_else(|| disposed("DirectoryStream"))
                .map_err(cell_error_to_js)?;
            stream.position = 0;
            Ok(JsValue::undefined())
        });
        register_method(context, &object, "rewind", 0, rewind)?;
    }

    {
        let registry = Rc::clone(&registry);
        let file_count = NativeFunction::from_closure(move |_this, _args, _context| {
            let registry = registry.borrow();
            let stream = registry
                .get::<NativeDirectoryStream>(handle)
                .ok_or_else(|| disposed("DirectoryStream"))
                .map_err(cell_error_to_js)?;
            Ok(JsValue::from(stream.entries.len() as f64))
        });
        register_method(context, &object, "fileCount", 0, file_count)?;
    }

    {
        let registry = Rc::clone(&registry);
        let file_name = NativeFunction::from_closure(move |_this, args, context| {
            let index = args
                .first()
                .cloned()
                .unwrap_or_else(JsValue::undefined)
                .to_number(context)? as usize;
            let registry = registry.borrow();
            let stream = registry
                .get::<NativeDirectoryStream>(handle)
                .ok_or_else(|| disposed("DirectoryStream"))
                .map_err(cell_error_to_js)?;
            Ok(stream
                .entries
                .get(index)
                .map_or_else(JsValue::null, |name| JsValue::from(js_string!(name.as_str()))))
        });
        register_method(context, &object, "fileName", 1, file_name)?;
    }

    {
        let entries: Vec<JsValue> = registry
            .borrow()
            .get::<NativeDirectoryStream>(handle)
            .map(|s| s.entries.iter().map(|n| JsValue::from(js_string!(n.as_str()))).collect())
            .unwrap_or_default();
        let array = JsArray::from_iter(entries, context);
        object
            .set(js_string!("entries"), array, true, context)
            .map_err(|e| js_error_to_cell("<DirectoryStream>", &e))?;
    }

    {
        let registry = Rc::clone(&registry);
        let dispose = NativeFunction::from_closure(move |_this, _args, _context| {
            registry.borrow_mut().remove(handle);
            Ok(JsValue::undefined())
        });
        register_method(context, &object, "dispose", 0, dispose)?;
    }

    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spherefs::{Roots, SphereFs};

    fn io(dir: &std::path::Path) -> Rc<FileIo> {
        Rc::new(FileIo::new(SphereFs::new(Roots {
            source: dir.to_path_buf(),
            output: dir.join("out"),
            system: dir.join("system"),
            user: None,
        })))
    }

    fn registry() -> Rc<RefCell<HostRegistry>> {
        Rc::new(RefCell::new(HostRegistry::new()))
    }

    #[test]
    fn file_stream_writes_then_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let mut bridge = Bridge::new();
        install(&mut bridge, io(tmp.path()), registry()).unwrap();

        let result = bridge
            .eval_script(
                "test.js",
                "var out = new FileStream('@/log.txt', 'write'); out.write('hi'); out.dispose(); \
                 var back = new FileStream('@/log.txt', 'read'); back.read(16);",
            )
            .unwrap();
        assert_eq!(result.as_str(), Some("hi".to_string()));
    }

    #[test]
    fn disposed_file_stream_rejects_further_reads() {
        let tmp = tempfile::tempdir().unwrap();
        let mut bridge = Bridge::new();
        install(&mut bridge, io(tmp.path()), registry()).unwrap();

        let result = bridge.eval_script(
            "test.js",
            "var s = new FileStream('@/x.txt', 'write'); s.dispose(); s.write('nope');",
        );
        assert!(result.is_err());
    }

    #[test]
    fn directory_stream_lists_entries_and_rewinds() {
        let tmp = tempfile::tempdir().unwrap();
        let dir_io = io(tmp.path());
        dir_io.write("$/a.txt", b"1").unwrap();
        dir_io.write("$/b.txt", b"2").unwrap();

        let mut bridge = Bridge::new();
        install(&mut bridge, dir_io, registry()).unwrap();

        let result = bridge
            .eval_script(
                "test.js",
                "var dir = new DirectoryStream('$/'); \
                 var count = dir.fileCount(); \
                 var first = dir.next(); dir.next(); var end = dir.next(); \
                 dir.rewind(); var again = dir.next(); \
                 [count, end === null, again === first].join(',');",
            )
            .unwrap();
        let text = result.as_str().unwrap();
        let parts: Vec<&str> = text.split(',').collect();
        assert_eq!(parts[0], "2");
        assert_eq!(parts[1], "true");
        assert_eq!(parts[2], "true");
    }
}
