//! The `FS` host object: direct file-system access from script, used by
//! Cellscripts that need to read a manifest or write a generated file
//! themselves rather than going through `install()`/a tool.

use crate::fs::FileIo;
use crate::js::{Bridge, ValueHandle};
use cell_schema::CellError;
use std::rc::Rc;

fn arg_str(args: &[ValueHandle], index: usize, fn_name: &str) -> Result<String, CellError> {
    args.get(index)
        .and_then(ValueHandle::as_str)
        .ok_or_else(|| CellError::ToolFailure(format!("{fn_name}: argument {index} must be a string")))
}

/// Install `FS.exists`, `FS.readFile`, `FS.writeFile`, `FS.createDirectory`,
/// `FS.deleteFile`, and `FS.removeDirectory` onto a fresh `FS` object bound
/// as a global.
///
/// # Errors
///
/// Returns an error if the bridge can't allocate or wire the object.
pub fn install(bridge: &mut Bridge, io: Rc<FileIo>) -> Result<(), CellError> {
    let fs_object = bridge.new_object();

    {
        let io = Rc::clone(&io);
        bridge.register_native_function(
            &fs_object,
            "exists",
            1,
            Box::new(move |args| {
                let path = arg_str(args, 0, "FS.exists")?;
                Ok(ValueHandle::from_bool(io.exists(&path).unwrap_or(false)))
            }),
        )?;
    }

    {
        let io = Rc::clone(&io);
        bridge.register_native_function(
            &fs_object,
            "readFile",
            1,
            Box::new(move |args| {
                let path = arg_str(args, 0, "FS.readFile")?;
                io.read_text(&path).map(|text| ValueHandle::from_str(&text))
            }),
        )?;
    }

    {
        let io = Rc::clone(&io);
        bridge.register_native_function(
            &fs_object,
            "writeFile",
            2,
            Box::new(move |args| {
                let path = arg_str(args, 0, "FS.writeFile")?;
                let contents = arg_str(args, 1, "FS.writeFile")?;
                io.write(&path, contents.as_bytes())?;
                Ok(ValueHandle::undefined())
            }),
        )?;
    }

    {
        let io = Rc::clone(&io);
        bridge.register_native_function(
            &fs_object,
            "createDirectory",
            1,
            Box::new(move |args| {
                let path = arg_str(args, 0, "FS.createDirectory")?;
                io.mkdir_p(&path)?;
                Ok(ValueHandle::undefined())
            }),
        )?;
    }

    {
        let io = Rc::clone(&io);
        bridge.register_native_function(
            &fs_object,
            "deleteFile",
            1,
            Box::new(move |args| {
                let path = arg_str(args, 0, "FS.deleteFile")?;
                io.remove_file(&path)?;
                Ok(ValueHandle::undefined())
            }),
        )?;
    }

    {
        let io = Rc::clone(&io);
        bridge.register_native_function(
            &fs_object,
            "removeDirectory",
            1,
            Box::new(move |args| {
                let path = arg_str(args, 0, "FS.removeDirectory")?;
                io.remove_dir_all(&path)?;
                Ok(ValueHandle::undefined())
            }),
        )?;
    }

    bridge.set_global("FS", fs_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileIo;
    use crate::spherefs::{Roots, SphereFs};

    fn io(dir: &std::path::Path) -> Rc<FileIo> {
        Rc::new(FileIo::new(SphereFs::new(Roots {
            source: dir.to_path_buf(),
            output: dir.join("out"),
            system: dir.join("system"),
            user: None,
        })))
    }

    #[test]
    fn write_then_exists_then_read_round_trip_through_script() {
        let tmp = tempfile::tempdir().unwrap();
        let mut bridge = Bridge::new();
        install(&mut bridge, io(tmp.path())).unwrap();

        let result = bridge
            .eval_script(
                "test.js",
                "FS.writeFile('@/greeting.txt', 'hello'); \
                 FS.exists('@/greeting.txt') && FS.readFile('@/greeting.txt') === 'hello';",
            )
            .unwrap();
        assert_eq!(result.as_bool(), Some(true));
    }

    #[test]
    fn exists_is_false_for_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut bridge = Bridge::new();
        install(&mut bridge, io(tmp.path())).unwrap();

        let result = bridge.eval_script("test.js", "FS.exists('@/nope.txt');").unwrap();
        assert_eq!(result.as_bool(), Some(false));
    }

    #[test]
    fn create_directory_then_delete_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut bridge = Bridge::new();
        install(&mut bridge, io(tmp.path())).unwrap();

        bridge
            .eval_script(
                "test.js",
                "FS.createDirectory('@/out'); \
                 FS.writeFile('@/out/a.txt', 'x'); \
                 FS.deleteFile('@/out/a.txt');",
            )
            .unwrap();
        let result = bridge.eval_script("test.js", "FS.exists('@/out/a.txt');").unwrap();
        assert_eq!(result.as_bool(), Some(false));
    }
}
