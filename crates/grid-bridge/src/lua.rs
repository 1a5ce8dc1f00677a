//! Lua 5.4 engine via the `mlua` crate.
//!
//! # Lua API
//!
//! Every Lua state the bridge creates has these globals:
//!
//! | Lua function                        | Effect                                        |
//! |-------------------------------------|-----------------------------------------------|
//! | `sheet(range)`                      | Read cells → array, column-major              |
//! | `sheet(range, data [, opts])`       | Write a scalar, list or table                 |
//! | `cell(ref [, value])`               | Read or write one cell                        |
//! | `get_table(range [, headers])`      | Read → `{ headers = {...}, rows = {...} }`    |
//! | `formula(text)`                     | Mark text as a formula                        |
//! | `use_sheet(n)` / `current_sheet()`  | Default sheet for unprefixed references       |
//! | `sheet_data[key]`                   | Cell cache the host fills when replying       |
//! | `print(...)`                        | Diagnostic frame, tab separated               |
//! | `show_svg(markup)`                  | Image frame                                   |
//! | `register(name, fn [, kinds])`      | Make `fn` callable by the host                |
//! | `letters_to_index(s)`               | `"AA"` → 27                                   |
//! | `index_to_letters(n)`               | 27 → `"AA"`                                   |
//!
//! Write data is a scalar, an array (a list, written down a column) or an
//! array of arrays (a table, one inner array per column, with an optional
//! `name` field used as its header). Strings starting with `=` are formulas.

use std::fmt::Display;

use grid_bridge_core::{
    decode_column, decode_range_to_table, encode_column, CellInput, Column, Scalar, Table, Value,
    FORMULA_SIGIL,
};
use grid_bridge_protocol::Frame;
use mlua::prelude::*;

use crate::config::BridgeConfig;
use crate::dispatch::{ArgKind, Handler, ScriptHandle, Signature};
use crate::engine::{ScriptEngine, ScriptFailure};
use crate::error::Result;
use crate::image::{capture_image, SvgDocument};
use crate::session::{fetch_range, SharedSession};

/// Registry slot holding functions registered for the host
const FUNCTIONS_KEY: &str = "grid_bridge.functions";

/// Globals removed by the sandbox
const UNSAFE_GLOBALS: [&str; 8] = [
    "os", "io", "debug", "package", "require", "loadfile", "dofile", "load",
];

/// A formula value created by `formula(text)`
#[derive(Debug, Clone)]
struct FormulaMarker(String);

impl LuaUserData for FormulaMarker {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
            Ok(format!("={}", this.0))
        });
    }
}

/// A Lua interpreter wired to a bridge session.
pub struct LuaEngine {
    lua: Lua,
}

impl LuaEngine {
    pub fn new(session: SharedSession, config: &BridgeConfig) -> Result<Self> {
        let lua = Lua::new();

        if config.sandbox {
            let globals = lua.globals();
            for name in UNSAFE_GLOBALS {
                globals.set(name, LuaValue::Nil)?;
            }
        }

        lua.set_named_registry_value(FUNCTIONS_KEY, lua.create_table()?)?;
        register_api(&lua, session)?;

        Ok(Self { lua })
    }
}

impl ScriptEngine for LuaEngine {
    fn execute(&mut self, chunk: &str) -> std::result::Result<(), ScriptFailure> {
        self.lua
            .load(chunk)
            .set_name("=chunk")
            .exec()
            .map_err(|e| ScriptFailure::new(describe(&e)))
    }

    fn invoke(&mut self, handle: ScriptHandle, args: &[Scalar]) -> std::result::Result<Scalar, ScriptFailure> {
        let call = || -> LuaResult<Scalar> {
            let functions: LuaTable = self.lua.named_registry_value(FUNCTIONS_KEY)?;
            let func: LuaFunction = functions.raw_get(handle.0)?;
            let lua_args: LuaMultiValue = args
                .iter()
                .map(|arg| scalar_to_lua(&self.lua, arg))
                .collect::<LuaResult<_>>()?;
            let ret = func.call::<LuaValue>(lua_args)?;
            lua_to_scalar(&ret)
        };
        call().map_err(|e| ScriptFailure::new(describe(&e)))
    }
}

fn runtime_error<E: Display>(e: E) -> LuaError {
    LuaError::RuntimeError(e.to_string())
}

/// Error text without the callback wrapping mlua adds
fn describe(error: &LuaError) -> String {
    match error {
        LuaError::CallbackError { cause, .. } => describe(cause),
        LuaError::RuntimeError(msg) => msg.clone(),
        LuaError::SyntaxError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn register_api(lua: &Lua, session: SharedSession) -> LuaResult<()> {
    let globals = lua.globals();

    // sheet(range [, data [, opts]])
    {
        let session = session.clone();
        globals.set(
            "sheet",
            lua.create_function(
                move |lua, (reference, data, opts): (String, Option<LuaValue>, Option<LuaTable>)| {
                    match data {
                        None => {
                            let values = read_range(lua, &session, &reference)?;
                            Ok(LuaValue::Table(scalars_to_array(lua, &values)?))
                        }
                        Some(data) => {
                            let value = lua_to_value(data, opts.as_ref())?;
                            session
                                .borrow_mut()
                                .write_value(&reference, &value)
                                .map_err(runtime_error)?;
                            Ok(LuaValue::Nil)
                        }
                    }
                },
            )?,
        )?;
    }

    // cell(ref [, value])
    {
        let session = session.clone();
        globals.set(
            "cell",
            lua.create_function(move |lua, (reference, value): (String, Option<LuaValue>)| {
                match value {
                    None => {
                        let values = read_range(lua, &session, &reference)?;
                        let first = values.first().cloned().unwrap_or_default();
                        scalar_to_lua(lua, &first)
                    }
                    Some(value) => {
                        let input = lua_to_input(&value)?;
                        session
                            .borrow_mut()
                            .write_value(&reference, &Value::Scalar(input))
                            .map_err(runtime_error)?;
                        Ok(LuaValue::Nil)
                    }
                }
            })?,
        )?;
    }

    // get_table(range [, headers]) → { headers = {...}?, rows = {{...}, ...} }
    {
        let session = session.clone();
        globals.set(
            "get_table",
            lua.create_function(move |lua, (reference, headers): (String, Option<bool>)| {
                let rows = session
                    .borrow()
                    .resolve_range(&reference)
                    .map_err(runtime_error)?
                    .range
                    .row_count() as usize;
                let values = read_range(lua, &session, &reference)?;
                let decoded = decode_range_to_table(values, rows, headers.unwrap_or(false))
                    .map_err(runtime_error)?;

                let result = lua.create_table()?;
                if let Some(header) = &decoded.header {
                    result.set("headers", scalars_to_array(lua, header)?)?;
                }
                let body = lua.create_table()?;
                for (i, row) in decoded.rows.iter().enumerate() {
                    body.raw_set(i + 1, scalars_to_array(lua, row)?)?;
                }
                result.set("rows", body)?;
                Ok(result)
            })?,
        )?;
    }

    globals.set(
        "formula",
        lua.create_function(|_, text: String| {
            let body = text.strip_prefix(FORMULA_SIGIL).unwrap_or(&text);
            Ok(FormulaMarker(body.to_string()))
        })?,
    )?;

    {
        let session = session.clone();
        globals.set(
            "use_sheet",
            lua.create_function(move |_, index: usize| {
                session.borrow_mut().set_current_sheet(index);
                Ok(())
            })?,
        )?;
    }

    {
        let session = session.clone();
        globals.set(
            "current_sheet",
            lua.create_function(move |_, ()| Ok(session.borrow().current_sheet()))?,
        )?;
    }

    // sheet_data: assignments land in the session cache
    {
        let proxy = lua.create_table()?;
        let meta = lua.create_table()?;

        let store = session.clone();
        meta.set(
            "__newindex",
            lua.create_function(move |_, (_, key, value): (LuaTable, String, LuaValue)| {
                let value = lua_to_scalar(&value)?;
                store.borrow_mut().store(key, value);
                Ok(())
            })?,
        )?;

        let lookup = session.clone();
        meta.set(
            "__index",
            lua.create_function(move |lua, (_, key): (LuaTable, String)| {
                match lookup.borrow().lookup(&key) {
                    Some(value) => scalar_to_lua(lua, value),
                    None => Ok(LuaValue::Nil),
                }
            })?,
        )?;

        proxy.set_metatable(Some(meta));
        globals.set("sheet_data", proxy)?;
    }

    {
        let session = session.clone();
        globals.set(
            "print",
            lua.create_function(move |_, args: LuaMultiValue| {
                let line = args.iter().map(display_value).collect::<Vec<_>>().join("\t");
                session
                    .borrow_mut()
                    .send(Frame::Diagnostic(line))
                    .map_err(runtime_error)
            })?,
        )?;
    }

    {
        let session = session.clone();
        globals.set(
            "show_svg",
            lua.create_function(move |_, markup: String| {
                let frame = capture_image(&SvgDocument::new(markup)).map_err(runtime_error)?;
                session.borrow_mut().send(frame).map_err(runtime_error)
            })?,
        )?;
    }

    // register(name, fn [, kinds])
    {
        let session = session.clone();
        globals.set(
            "register",
            lua.create_function(
                move |lua, (name, func, kinds): (String, LuaFunction, Option<Vec<String>>)| {
                    if name.is_empty() {
                        return Err(runtime_error(
                            "bad argument #1 to 'register' (name must not be empty)",
                        ));
                    }
                    let signature = match kinds {
                        None => Signature::Variadic,
                        Some(kinds) => Signature::Fixed(
                            kinds
                                .iter()
                                .map(|k| k.parse::<ArgKind>())
                                .collect::<std::result::Result<Vec<_>, _>>()
                                .map_err(runtime_error)?,
                        ),
                    };

                    let functions: LuaTable = lua.named_registry_value(FUNCTIONS_KEY)?;
                    let handle = ScriptHandle(functions.raw_len() as u64 + 1);
                    functions.raw_set(handle.0, func)?;

                    session
                        .borrow_mut()
                        .registry_mut()
                        .register(name, signature, Handler::Script(handle));
                    Ok(())
                },
            )?,
        )?;
    }

    globals.set(
        "letters_to_index",
        lua.create_function(|_, letters: String| decode_column(&letters).map_err(runtime_error))?,
    )?;

    globals.set(
        "index_to_letters",
        lua.create_function(|_, index: u32| encode_column(index).map_err(runtime_error))?,
    )?;

    Ok(())
}

/// Request a range from the host and run its reply in this Lua state
fn read_range(lua: &Lua, session: &SharedSession, reference: &str) -> LuaResult<Vec<Scalar>> {
    fetch_range(session, reference, |reply| {
        lua.load(reply)
            .set_name("=host")
            .exec()
            .map_err(|e| ScriptFailure::new(describe(&e)))
    })
    .map_err(runtime_error)
}

fn scalar_to_lua(lua: &Lua, value: &Scalar) -> LuaResult<LuaValue> {
    match value {
        Scalar::Empty => Ok(LuaValue::Nil),
        Scalar::Bool(b) => Ok(LuaValue::Boolean(*b)),
        Scalar::Number(n) => Ok(LuaValue::Number(*n)),
        Scalar::Text(s) => Ok(LuaValue::String(lua.create_string(s)?)),
    }
}

/// Array of values with an `n` field, since empty cells leave holes
fn scalars_to_array(lua: &Lua, values: &[Scalar]) -> LuaResult<LuaTable> {
    let table = lua.create_table_with_capacity(values.len(), 1)?;
    for (i, value) in values.iter().enumerate() {
        table.raw_set(i + 1, scalar_to_lua(lua, value)?)?;
    }
    table.raw_set("n", values.len())?;
    Ok(table)
}

fn lua_to_scalar(value: &LuaValue) -> LuaResult<Scalar> {
    match value {
        LuaValue::Nil => Ok(Scalar::Empty),
        LuaValue::Boolean(b) => Ok(Scalar::Bool(*b)),
        LuaValue::Integer(i) => Ok(Scalar::Number(*i as f64)),
        LuaValue::Number(n) => Ok(Scalar::Number(*n)),
        LuaValue::String(s) => Ok(Scalar::Text(s.to_string_lossy().into())),
        other => Err(runtime_error(format!(
            "{} has no cell representation",
            other.type_name()
        ))),
    }
}

fn lua_to_input(value: &LuaValue) -> LuaResult<CellInput> {
    match value {
        LuaValue::String(s) => Ok(CellInput::from_user_text(s.to_string_lossy())),
        LuaValue::UserData(ud) => match ud.borrow::<FormulaMarker>() {
            Ok(marker) => Ok(CellInput::Formula(marker.0.clone())),
            Err(_) => Err(runtime_error("userdata has no cell representation")),
        },
        other => lua_to_scalar(other).map(CellInput::Literal),
    }
}

/// Values `1..=#table`, with nil holes read as empty cells
fn array_inputs(table: &LuaTable) -> LuaResult<Vec<CellInput>> {
    (1..=table.raw_len())
        .map(|i| lua_to_input(&table.raw_get::<LuaValue>(i)?))
        .collect()
}

fn lua_to_value(data: LuaValue, opts: Option<&LuaTable>) -> LuaResult<Value> {
    let LuaValue::Table(table) = data else {
        return lua_to_input(&data).map(Value::Scalar);
    };

    if !matches!(table.raw_get::<LuaValue>(1)?, LuaValue::Table(_)) {
        return array_inputs(&table).map(Value::List);
    }

    let mut columns = Vec::with_capacity(table.raw_len());
    for i in 1..=table.raw_len() {
        let column: LuaTable = table.raw_get(i).map_err(|_| {
            runtime_error(format!("table column {i} is not an array"))
        })?;
        let name: Option<String> = column.get("name")?;
        columns.push(Column {
            name,
            values: array_inputs(&column)?,
        });
    }

    let all_named = columns.iter().all(|c| c.name.is_some());
    let include_headers = match opts {
        Some(opts) => opts.get::<Option<bool>>("headers")?.unwrap_or(all_named),
        None => all_named,
    };

    Ok(Value::Table(Table::new(columns, include_headers)))
}

fn display_value(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{:.0}", n)
            } else {
                format!("{}", n)
            }
        }
        LuaValue::String(s) => s.to_string_lossy().into(),
        LuaValue::UserData(ud) => match ud.borrow::<FormulaMarker>() {
            Ok(marker) => format!("={}", marker.0),
            Err(_) => "userdata".to_string(),
        },
        other => other.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::Channel;
    use grid_bridge_core::SheetRange;
    use grid_bridge_protocol::{parse_stream, Outbound, WriteKind};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::io::{self, Cursor, Write};
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Captured(Rc<RefCell<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn frames(&self) -> Vec<Frame> {
            let text = String::from_utf8(self.0.borrow().clone()).unwrap();
            parse_stream(&text)
                .unwrap()
                .into_iter()
                .filter_map(|item| match item {
                    Outbound::Frame(frame) => Some(frame),
                    Outbound::Raw(_) => None,
                })
                .collect()
        }

        fn writes(&self) -> Vec<Vec<String>> {
            self.frames()
                .into_iter()
                .filter_map(|frame| match frame {
                    Frame::Write(command) => Some(command.arguments),
                    _ => None,
                })
                .collect()
        }
    }

    fn engine_with(input: &str, config: BridgeConfig) -> (LuaEngine, SharedSession, Captured) {
        let out = Captured::default();
        let channel = Channel::new(Cursor::new(input.as_bytes().to_vec()), out.clone());
        let session = Session::new(channel, &config).into_shared();
        let engine = LuaEngine::new(session.clone(), &config).unwrap();
        (engine, session, out)
    }

    fn engine(input: &str) -> (LuaEngine, SharedSession, Captured) {
        engine_with(input, BridgeConfig::default())
    }

    #[test]
    fn test_write_scalar_and_formula() {
        let (mut engine, _, out) = engine("");
        engine
            .execute("sheet('A1', 3)\ncell('B1', '=A1*2')\nsheet('C1', formula('SUM(A1:B1)'))\ncell('D1', 'text')")
            .unwrap();

        assert_eq!(
            out.writes(),
            vec![
                vec!["RANGE", "SETSINGLE", "A1:A1", "0", "=3.000000000000"],
                vec!["RANGE", "SETSINGLE", "B1:B1", "0", "=A1*2"],
                vec!["RANGE", "SETSINGLE", "C1:C1", "0", "=SUM(A1:B1)"],
                vec!["RANGE", "SETSINGLE", "D1:D1", "0", "=\"text\""],
            ]
        );
    }

    #[test]
    fn test_write_list_to_bare_column() {
        let (mut engine, _, out) = engine("");
        engine.execute("sheet('C', {'hi', 'there'})").unwrap();
        assert_eq!(
            out.writes(),
            vec![vec!["RANGE", "SETLIST", "C1:C2", "0", "\"hi\"", "\"there\""]]
        );
    }

    #[test]
    fn test_write_table_with_headers() {
        let (mut engine, _, out) = engine("");
        engine
            .execute("sheet('1!A1', { {name='x', 1, 2, 3}, {name='y', 'a', 'b', 'c'} })")
            .unwrap();

        let writes = out.writes();
        assert_eq!(&writes[0][..4], ["RANGE", "SETLIST", "A1:B4", "1"]);
        assert_eq!(writes[0][4], "\"x\"");
        assert_eq!(writes[0].len(), 4 + 8);
    }

    #[test]
    fn test_write_table_headers_option() {
        let (mut engine, _, out) = engine("");
        engine
            .execute("sheet('A1', { {name='x', 1, 2}, {name='y', 3, 4} }, {headers=false})")
            .unwrap();
        assert_eq!(out.writes()[0][2], "A1:B2");
    }

    #[test]
    fn test_read_with_host_reply() {
        let reply = "sheet_data[\"0!A1\"] = 5\nsheet_data[\"0!A2\"] = \"x\"\n\n";
        let (mut engine, _, out) = engine(reply);
        engine
            .execute("local v = sheet('A1:A2')\nassert(v[1] == 5 and v[2] == 'x' and v.n == 2)\nprint(v[1] + 1)")
            .unwrap();

        let frames = out.frames();
        assert_eq!(
            frames[0],
            Frame::DataRequest(SheetRange::parse("0!A1:A2").unwrap())
        );
        assert_eq!(frames[1], Frame::Diagnostic("6".into()));
    }

    #[test]
    fn test_cell_read_and_missing_data() {
        let (mut engine, _, _) = engine("sheet_data['0!B2'] = true\n\n\n");
        engine.execute("assert(cell('B2') == true)").unwrap();

        let err = engine.execute("cell('B3')").unwrap_err();
        assert!(err.message.contains("0!B3"), "{}", err.message);
    }

    #[test]
    fn test_nested_read_in_reply_fails() {
        let (mut engine, _, out) = engine("sheet('A5')\n\n");
        let err = engine.execute("sheet('A1')").unwrap_err();
        assert!(err.message.contains("0!A1"), "{}", err.message);

        // The reply's own read was refused, not sent
        let frames = out.frames();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].is_error());
    }

    #[test]
    fn test_get_table() {
        let reply = "sheet_data['0!A1'] = 'x'\nsheet_data['0!A2'] = 1\nsheet_data['0!A3'] = 2\n\
                     sheet_data['0!B1'] = 'y'\nsheet_data['0!B2'] = 3\nsheet_data['0!B3'] = 4\n\n";
        let (mut engine, _, _) = engine(reply);
        engine
            .execute(
                "local t = get_table('A1:B3', true)\n\
                 assert(t.headers[1] == 'x' and t.headers[2] == 'y')\n\
                 assert(#t.rows == 2 and t.rows[2][1] == 2 and t.rows[1][2] == 3)",
            )
            .unwrap();
    }

    #[test]
    fn test_current_sheet() {
        let (mut engine, session, out) = engine("");
        engine
            .execute("use_sheet(2)\nassert(current_sheet() == 2)\nsheet('A1', 1)")
            .unwrap();
        assert_eq!(session.borrow().current_sheet(), 2);
        assert_eq!(out.writes()[0][3], "2");
    }

    #[test]
    fn test_column_helpers() {
        let (mut engine, _, _) = engine("");
        engine
            .execute("assert(letters_to_index('AA') == 27)\nassert(index_to_letters(52) == 'AZ')")
            .unwrap();
        assert!(engine.execute("index_to_letters(0)").is_err());
    }

    #[test]
    fn test_register_and_invoke() {
        let (mut engine, session, _) = engine("");
        engine
            .execute("register('double', function(x) return x * 2 end, {'number'})")
            .unwrap();

        let entry = session.borrow().registry().get("double").cloned().unwrap();
        assert_eq!(entry.signature, Signature::Fixed(vec![ArgKind::Number]));
        let Handler::Script(handle) = entry.handler else {
            panic!("expected a script handler");
        };
        assert_eq!(
            engine.invoke(handle, &[Scalar::Number(21.0)]).unwrap(),
            Scalar::Number(42.0)
        );
    }

    #[test]
    fn test_show_svg() {
        let (mut engine, _, out) = engine("");
        engine.execute("show_svg('<svg/>')").unwrap();
        assert_eq!(out.frames(), vec![Frame::Image("PHN2Zy8+".into())]);
    }

    #[test]
    fn test_failure_message() {
        let (mut engine, _, _) = engine("");
        let err = engine.execute("error('boom')").unwrap_err();
        assert!(err.message.ends_with("boom"), "{}", err.message);

        let err = engine.execute("sheet('A0', 1)").unwrap_err();
        assert!(err.message.contains("row number"), "{}", err.message);
    }

    #[test]
    fn test_sandbox() {
        let config = BridgeConfig {
            sandbox: true,
            ..BridgeConfig::default()
        };
        let (mut engine, _, _) = engine_with("", config);
        engine.execute("assert(os == nil and io == nil and load == nil)").unwrap();

        let (mut open, _, _) = self::engine("");
        open.execute("assert(os ~= nil)").unwrap();
    }

    #[test]
    fn test_write_kinds_reach_host() {
        let (mut engine, _, out) = engine("");
        engine.execute("sheet('A1:A2', {1, 2})\nsheet('B1', 1)").unwrap();
        let kinds: Vec<_> = out
            .frames()
            .iter()
            .filter_map(|f| match f {
                Frame::Write(c) => c.kind(),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![WriteKind::SetList, WriteKind::SetSingle]);
    }
}
