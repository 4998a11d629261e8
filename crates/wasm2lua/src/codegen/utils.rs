//! Lua spelling helpers: literals, string escapes and identifier sanitizing.

use wasm2lua_runtime::names;

const LUA_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Globals the generated code or the Lua standard library relies on.
const RESERVED_GLOBALS: &[&str] = &[
    // base library
    "assert", "collectgarbage", "dofile", "error", "getfenv", "getmetatable", "ipairs", "load",
    "loadfile", "loadstring", "module", "next", "pairs", "pcall", "print", "rawequal", "rawget",
    "rawlen", "rawset", "require", "select", "setfenv", "setmetatable", "tonumber", "tostring",
    "type", "unpack", "xpcall", "_G", "_ENV", "_VERSION", "arg",
    // library tables
    "bit", "coroutine", "debug", "ffi", "io", "jit", "math", "os", "package", "string", "table",
    "utf8",
    "__setjmp_data__", "__setjmp_frame__",
];

/// Names of the form `reg<N>`, `mem_<N>` or `__TABLE_*` are taken by
/// generated locals.
fn is_generated_local(name: &str) -> bool {
    if name.starts_with("__TABLE_") {
        return true;
    }
    let numbered = |prefix: &str| {
        name.strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    };
    numbered("reg") || numbered("mem_")
}

/// Integer literal; negatives are parenthesized so they compose in any
/// operator position.
pub fn lua_int(value: i64) -> String {
    if value < 0 {
        format!("({value})")
    } else {
        value.to_string()
    }
}

/// Float literal. Infinities and NaN have no literal syntax in Lua.
pub fn lua_float(value: f64) -> String {
    if value.is_nan() {
        return "(0/0)".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "math.huge".to_string()
        } else {
            "(-math.huge)".to_string()
        };
    }
    let text = format!("{value:?}");
    if value.is_sign_negative() {
        format!("({text})")
    } else {
        text
    }
}

/// Double-quoted Lua string literal.
pub fn lua_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\{:03}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Single-quoted literal holding arbitrary bytes, for data segments.
pub fn lua_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 2);
    out.push('\'');
    for &b in bytes {
        match b {
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            // LuaJIT reads `\ddd` escapes; a fixed width keeps a following
            // digit from being absorbed.
            _ => out.push_str(&format!("\\{b:03}")),
        }
    }
    out.push('\'');
    out
}

pub fn is_lua_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !LUA_KEYWORDS.contains(&name)
}

/// `base.key` when `key` is a valid identifier, `base["key"]` otherwise.
pub fn index_expr(base: &str, key: &str) -> String {
    if is_lua_identifier(key) {
        format!("{base}.{key}")
    } else {
        format!("{base}[{}]", lua_string(key))
    }
}

fn replacement(c: char) -> Option<&'static str> {
    Some(match c {
        '.' => "__IDENT_CHAR_DOT__",
        '-' => "__IDENT_CHAR_MINUS__",
        '$' => "__IDENT_CHAR_DOLLAR__",
        '@' => "__IDENT_CHAR_AT__",
        ':' => "__IDENT_CHAR_COLON__",
        '<' => "__IDENT_CHAR_LT__",
        '>' => "__IDENT_CHAR_GT__",
        ' ' => "__IDENT_CHAR_SPACE__",
        ',' => "__IDENT_CHAR_COMMA__",
        '*' => "__IDENT_CHAR_STAR__",
        '&' => "__IDENT_CHAR_AMP__",
        '(' => "__IDENT_CHAR_LPAREN__",
        ')' => "__IDENT_CHAR_RPAREN__",
        '[' => "__IDENT_CHAR_LBRACKET__",
        ']' => "__IDENT_CHAR_RBRACKET__",
        '~' => "__IDENT_CHAR_TILDE__",
        _ => return None,
    })
}

/// Map an arbitrary WebAssembly name to a Lua identifier that cannot shadow
/// a keyword, a standard global or a runtime helper. Collisions between
/// sanitized names are resolved by the caller.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if let Some(text) = replacement(c) {
            out.push_str(text);
        } else {
            out.push_str(&format!("__IDENT_CHAR_U{:X}__", c as u32));
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if LUA_KEYWORDS.contains(&out.as_str())
        || RESERVED_GLOBALS.contains(&out.as_str())
        || names::ALL.contains(&out.as_str())
        || is_generated_local(&out)
    {
        out.insert(0, '_');
    }
    out
}
