use std::cell::{Cell, RefCell};

use anyhow::{Result, anyhow};
use mlua::prelude::*;

use crate::context::RunContext;
use crate::error::ReplayError;
use crate::logger;
use crate::platform::Platform;
use crate::sleep;
use crate::types::Point;

/// Lua VM used by scripted steps of one run.
///
/// Scripts see a fresh `ctx` table on every call (`pointer_x`, `pointer_y`,
/// `last_x`, `last_y`, `step`) and the `F` table: `F.log`, `F.sleep(ms)`,
/// `F.move(x, y)`, `F.click()`. A script that evaluates to `false` fails its
/// step; any other value succeeds.
pub struct ScriptHost {
    lua: Lua,
}

/// Helper to convert mlua::Error -> anyhow::Error
fn lua_err(e: mlua::Error) -> anyhow::Error {
    anyhow!("{}", e)
}

impl ScriptHost {
    pub fn new() -> Result<Self> {
        let lua = Lua::new();
        register_globals(&lua).map_err(lua_err)?;
        Ok(Self { lua })
    }

    /// Compile `source` without running it.
    pub fn check(name: &str, source: &str) -> crate::error::Result<()> {
        let lua = Lua::new();
        lua.load(source)
            .set_name(name)
            .into_function()
            .map(|_| ())
            .map_err(|e| ReplayError::Script { name: name.to_string(), message: e.to_string() })
    }

    /// Evaluate a script against the run context. Pointer moves made through
    /// `F.move` are written back to `ctx.current_pointer`.
    pub fn run(
        &self,
        name: &str,
        source: &str,
        step: usize,
        ctx: &mut RunContext,
        platform: &mut dyn Platform,
    ) -> Result<bool> {
        let view = self.lua.create_table().map_err(lua_err)?;
        view.set("pointer_x", ctx.current_pointer.x).map_err(lua_err)?;
        view.set("pointer_y", ctx.current_pointer.y).map_err(lua_err)?;
        if let Some(last) = ctx.last_search_position {
            view.set("last_x", last.x).map_err(lua_err)?;
            view.set("last_y", last.y).map_err(lua_err)?;
        }
        view.set("step", step).map_err(lua_err)?;
        self.lua.globals().set("ctx", view).map_err(lua_err)?;

        let f_table: LuaTable = self.lua.globals().get("F").map_err(lua_err)?;
        let pointer = RefCell::new(platform);
        let cursor = Cell::new(ctx.current_pointer);

        let result = self.lua.scope(|scope| {
            // F.move / F.click borrow the platform only for the duration of this call
            f_table.set(
                "move",
                scope.create_function(|_, (x, y): (i32, i32)| {
                    let at = Point::new(x, y);
                    pointer.borrow_mut().move_to(at);
                    cursor.set(at);
                    Ok(())
                })?,
            )?;
            f_table.set(
                "click",
                scope.create_function(|_, ()| {
                    pointer.borrow_mut().click(cursor.get());
                    Ok(())
                })?,
            )?;

            let value: LuaValue = self.lua.load(source).set_name(name).eval()?;
            Ok(!matches!(value, LuaValue::Boolean(false)))
        });

        ctx.current_pointer = cursor.get();
        result.map_err(lua_err)
    }
}

/// Register the F.* global table into a Lua state.
fn register_globals(lua: &Lua) -> mlua::Result<()> {
    let f_table = lua.create_table()?;

    // F.sleep(ms)
    let sleep_fn = lua.create_function(|_, ms: u64| {
        sleep::sleep_ms(ms);
        Ok(())
    })?;
    f_table.set("sleep", sleep_fn)?;

    // F.log(msg)
    let log_fn = lua.create_function(|_, msg: String| {
        logger::info_p("script", &msg);
        Ok(())
    })?;
    f_table.set("log", log_fn)?;

    lua.globals().set("F", f_table)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::{PointerEvent, StubPlatform};

    #[test]
    fn check_reports_syntax_errors() {
        assert!(ScriptHost::check("ok", "return 1 + 1").is_ok());
        assert!(matches!(
            ScriptHost::check("broken", "return (("),
            Err(ReplayError::Script { name, .. }) if name == "broken"
        ));
    }

    #[test]
    fn result_value_decides_success() {
        let host = ScriptHost::new().unwrap();
        let mut platform = StubPlatform::blank(4, 4);
        let mut ctx = RunContext::default();
        assert!(host.run("t", "return true", 0, &mut ctx, &mut platform).unwrap());
        assert!(host.run("nil", "local a = 1", 0, &mut ctx, &mut platform).unwrap());
        assert!(!host.run("f", "return false", 0, &mut ctx, &mut platform).unwrap());
        assert!(host.run("err", "error('boom')", 0, &mut ctx, &mut platform).is_err());
    }

    #[test]
    fn script_reads_context_and_moves_pointer() {
        let host = ScriptHost::new().unwrap();
        let mut platform = StubPlatform::blank(4, 4);
        let mut ctx = RunContext::new(Point::new(10, 20));
        ctx.last_search_position = Some(Point::new(7, 8));
        let src = r#"
            F.move(ctx.last_x + 1, ctx.pointer_y)
            F.click()
            return ctx.step == 3
        "#;
        assert!(host.run("nudge", src, 3, &mut ctx, &mut platform).unwrap());
        assert_eq!(ctx.current_pointer, Point::new(8, 20));
        assert_eq!(
            platform.events(),
            &[PointerEvent::Move(Point::new(8, 20)), PointerEvent::Click(Point::new(8, 20))]
        );
    }

    #[test]
    fn missing_last_position_is_nil() {
        let host = ScriptHost::new().unwrap();
        let mut platform = StubPlatform::blank(4, 4);
        let mut ctx = RunContext::default();
        assert!(host.run("nil", "return ctx.last_x == nil", 0, &mut ctx, &mut platform).unwrap());
    }
}
