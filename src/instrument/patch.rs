//! Entrypoint source patching.
//!
//! Both patchers insert a guarded load of the bootstrap, tagged with
//! [`ENTRYPOINT_MARKER`], and return `None` when the marker is already present.

use super::ENTRYPOINT_MARKER;

pub fn is_patched(source: &str) -> bool {
    source.contains(ENTRYPOINT_MARKER)
}

fn python_block(module: &str) -> String {
    format!(
        "# {marker}\ntry:\n    import {module}  # noqa: F401\nexcept ImportError:\n    pass\n",
        marker = ENTRYPOINT_MARKER,
        module = module,
    )
}

const TRIPLE_QUOTES: [&str; 2] = ["\"\"\"", "'''"];

fn is_top_level_import(line: &str) -> bool {
    (line.starts_with("import ") || line.starts_with("from ")) && !is_future_import(line)
}

fn is_future_import(line: &str) -> bool {
    line.starts_with("from __future__ ")
}

fn is_preamble(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// A top-level statement that is a bare string literal, such as a module docstring.
fn starts_string_literal(line: &str) -> bool {
    let prefix = line
        .chars()
        .take_while(|c| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B' | 'f' | 'F'))
        .count();
    prefix <= 2 && matches!(line[prefix..].chars().next(), Some('"' | '\''))
}

/// Triple-quote delimiter still open at the end of `line`, given the one open
/// at its start.
fn scan_triple_quotes(line: &str, mut open: Option<&'static str>) -> Option<&'static str> {
    let mut rest = line;
    loop {
        match open {
            Some(delim) => match rest.find(delim) {
                Some(idx) => {
                    rest = &rest[idx + delim.len()..];
                    open = None;
                }
                None => return open,
            },
            None => {
                let (idx, delim) = TRIPLE_QUOTES
                    .iter()
                    .filter_map(|d| rest.find(d).map(|idx| (idx, *d)))
                    .min_by_key(|(idx, _)| *idx)?;
                if rest.find('#').is_some_and(|hash| hash < idx) {
                    return None;
                }
                rest = &rest[idx + delim.len()..];
                open = Some(delim);
            }
        }
    }
}

/// Index of the line after the string statement starting at `start`.
fn end_of_string(lines: &[&str], start: usize) -> usize {
    let mut open = None;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        open = scan_triple_quotes(line, open);
        if open.is_none() {
            return idx + 1;
        }
    }
    lines.len()
}

/// Index of the line after a `from __future__` import, following parentheses.
fn end_of_future_import(lines: &[&str], start: usize) -> usize {
    if !lines[start].contains('(') || lines[start].contains(')') {
        return start + 1;
    }
    lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, l)| l.contains(')'))
        .map_or(lines.len(), |(idx, _)| idx + 1)
}

/// First line the bootstrap may precede: after the leading comments, the module
/// docstring and every `from __future__` import.
fn python_header_end(lines: &[&str]) -> usize {
    let mut idx = 0;
    let mut end = None;
    let mut docstring_allowed = true;

    while idx < lines.len() {
        let line = lines[idx];
        if is_preamble(line) {
            idx += 1;
            continue;
        }
        if docstring_allowed && starts_string_literal(line) {
            idx = end_of_string(lines, idx);
        } else if is_future_import(line) {
            idx = end_of_future_import(lines, idx);
        } else {
            break;
        }
        docstring_allowed = false;
        end = Some(idx);
    }

    end.unwrap_or(idx)
}

fn first_import(lines: &[&str], start: usize) -> Option<usize> {
    let mut open = None;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        if open.is_none() && is_top_level_import(line) {
            return Some(idx);
        }
        open = scan_triple_quotes(line, open);
    }
    None
}

/// Inserts the bootstrap import before the first top-level import. It never goes
/// above the module docstring or a `from __future__` import, and imports inside
/// triple-quoted strings do not count. Without imports, the block goes right
/// after that header.
pub fn patch_python(source: &str, module: &str) -> Option<String> {
    if is_patched(source) {
        return None;
    }

    let lines: Vec<&str> = source.lines().collect();
    let header_end = python_header_end(&lines);
    let insert_at = first_import(&lines, header_end).unwrap_or(header_end);

    let mut patched = String::with_capacity(source.len() + 128);
    for line in &lines[..insert_at] {
        patched.push_str(line);
        patched.push('\n');
    }
    patched.push_str(&python_block(module));
    for line in &lines[insert_at..] {
        patched.push_str(line);
        patched.push('\n');
    }
    Some(patched)
}

/// `require` path from `entry` to `bootstrap`, both relative to the same root.
pub fn node_require_path(entry: &str, bootstrap: &str) -> String {
    let depth = entry
        .trim_start_matches("./")
        .split('/')
        .filter(|s| !s.is_empty())
        .count()
        .saturating_sub(1);
    if depth == 0 {
        format!("./{}", bootstrap)
    } else {
        format!("{}{}", "../".repeat(depth), bootstrap)
    }
}

fn is_js_preamble(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("#!")
        || trimmed == "'use strict';"
        || trimmed == "\"use strict\";"
        || trimmed == "'use strict'"
        || trimmed == "\"use strict\""
}

/// True when the source uses ES module syntax at the top level, where `require`
/// is not defined.
pub fn is_esm_source(source: &str) -> bool {
    source.lines().any(|line| {
        line.starts_with("import ")
            || line.starts_with("import{")
            || line.starts_with("import'")
            || line.starts_with("import\"")
            || line.starts_with("export ")
    })
}

/// Prepends a guarded `require` of the bootstrap, keeping a shebang and a
/// `'use strict'` directive in front. A missing bootstrap, missing telemetry
/// packages or a module scope without `require` never stop the application.
pub fn patch_node(source: &str, require_path: &str) -> Option<String> {
    if is_patched(source) {
        return None;
    }

    let lines: Vec<&str> = source.lines().collect();
    let insert_at = lines.iter().take_while(|l| is_js_preamble(l)).count();

    let mut patched = String::with_capacity(source.len() + 160);
    for line in &lines[..insert_at] {
        patched.push_str(line);
        patched.push('\n');
    }
    patched.push_str(&format!(
        "// {marker}\nif (typeof require === 'function') {{\n  try {{\n    require('{path}');\n  }} catch (err) {{\n    if (err.code !== 'MODULE_NOT_FOUND') throw err;\n  }}\n}}\n",
        marker = ENTRYPOINT_MARKER,
        path = require_path,
    ));
    for line in &lines[insert_at..] {
        patched.push_str(line);
        patched.push('\n');
    }
    Some(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    const FLASK_APP: &str = "from flask import Flask\n\napp = Flask(__name__)\n";

    #[test]
    fn test_patch_python_before_first_import() {
        let patched = patch_python(FLASK_APP, "otel_init").unwrap();
        let marker = patched.find(ENTRYPOINT_MARKER).unwrap();
        let import = patched.find("from flask import Flask").unwrap();
        assert!(marker < import);
        assert!(patched.contains("    import otel_init  # noqa: F401\n"));
        assert!(patched.ends_with("app = Flask(__name__)\n"));
    }

    #[test]
    fn test_patch_python_keeps_future_imports_first() {
        let source = "#!/usr/bin/env python\n\"\"\"Django's command-line utility.\"\"\"\nfrom __future__ import annotations\nimport os\nimport sys\n";
        let patched = patch_python(source, "otel_init").unwrap();
        let future = patched.find("from __future__").unwrap();
        let marker = patched.find(ENTRYPOINT_MARKER).unwrap();
        let os = patched.find("import os").unwrap();
        assert!(future < marker && marker < os);
    }

    #[test]
    fn test_patch_python_after_lone_future_import() {
        let patched = patch_python("from __future__ import annotations\n\nAPP = 1\n", "otel_init").unwrap();
        let future = patched.find("from __future__").unwrap();
        let marker = patched.find(ENTRYPOINT_MARKER).unwrap();
        let app = patched.find("APP = 1").unwrap();
        assert!(future < marker && marker < app);
    }

    #[test]
    fn test_patch_python_after_parenthesized_future_import() {
        let source = "from __future__ import (\n    annotations,\n    division,\n)\nimport os\n";
        let patched = patch_python(source, "otel_init").unwrap();
        assert!(patched.starts_with(
            "from __future__ import (\n    annotations,\n    division,\n)\n# obsinject"
        ));
    }

    #[test]
    fn test_patch_python_skips_imports_inside_docstring() {
        let source = "\"\"\"Shop API.\nfrom here the app is served\n\"\"\"\nimport flask\n";
        let patched = patch_python(source, "otel_init").unwrap();
        let docstring_end = patched.find("\"\"\"\n#").unwrap();
        let marker = patched.find(ENTRYPOINT_MARKER).unwrap();
        let import = patched.find("import flask").unwrap();
        assert!(docstring_end < marker && marker < import);
        assert!(patched.contains("\nfrom here the app is served\n\"\"\"\n# obsinject"));
    }

    #[test]
    fn test_patch_python_skips_imports_inside_later_strings() {
        let source = "USAGE = '''\nimport this first\n'''\n\nimport flask\n";
        let patched = patch_python(source, "otel_init").unwrap();
        assert!(patched.starts_with("USAGE = '''\nimport this first\n'''\n\n# obsinject"));
        assert!(patched.ends_with("    pass\nimport flask\n"));
    }

    #[test]
    fn test_patch_python_docstring_without_imports() {
        let patched = patch_python("r\"\"\"Entry point.\"\"\"\nmain()\n", "otel_init").unwrap();
        assert!(patched.starts_with("r\"\"\"Entry point.\"\"\"\n# obsinject"));
    }

    #[test]
    fn test_patch_python_ignores_indented_imports() {
        let source = "def main():\n    from django.core.management import execute_from_command_line\n";
        let patched = patch_python(source, "otel_init").unwrap();
        assert!(patched.starts_with(&format!("# {}", ENTRYPOINT_MARKER)));
    }

    #[test]
    fn test_patch_python_without_imports_after_shebang() {
        let patched = patch_python("#!/usr/bin/env python\nprint('hi')\n", "otel_init").unwrap();
        assert!(patched.starts_with("#!/usr/bin/env python\n# obsinject"));
    }

    #[test]
    fn test_patch_is_idempotent() {
        let once = patch_python(FLASK_APP, "otel_init").unwrap();
        assert_eq!(patch_python(&once, "otel_init"), None);

        let once = patch_node("const express = require('express');\n", "./otel.js").unwrap();
        assert_eq!(patch_node(&once, "./otel.js"), None);
    }

    #[test]
    fn test_patch_node_keeps_directives() {
        let source = "#!/usr/bin/env node\n'use strict';\nconst express = require('express');\n";
        let patched = patch_node(source, "./otel.js").unwrap();
        assert!(patched.starts_with("#!/usr/bin/env node\n'use strict';\n// obsinject"));
        assert!(patched.contains("if (typeof require === 'function') {\n"));
        assert!(patched.contains("    require('./otel.js');\n"));
        assert!(patched.ends_with("const express = require('express');\n"));
    }

    #[parameterized(
        commonjs = { "const express = require('express');\n", false },
        default_import = { "import express from 'express';\n", true },
        side_effect_import = { "'use strict';\nimport './tracing.js';\n", true },
        export = { "export default app;\n", true },
        indented_dynamic = { "async function f() {\n  const m = await import('x');\n}\n", false },
    )]
    fn test_is_esm_source(source: &str, expected: bool) {
        assert_eq!(is_esm_source(source), expected);
    }

    #[parameterized(
        root = { "app.js", "./otel.js" },
        dotted = { "./server.js", "./otel.js" },
        nested = { "dist/main.js", "../otel.js" },
        deep = { "src/api/index.js", "../../otel.js" },
    )]
    fn test_node_require_path(entry: &str, expected: &str) {
        assert_eq!(node_require_path(entry, "otel.js"), expected);
    }
}
