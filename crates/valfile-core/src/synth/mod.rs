//! Synthesis of the Go validation program.
//!
//! A request is first lowered into a [`Program`], a small structured model of
//! the generated file (imports, constants, type declarations, decode and
//! validate steps), which is then rendered to text in one pass. The program
//! decodes the embedded payload strictly into the root type, validates it,
//! and prints every failure as a marker-prefixed line on stdout. It prints
//! nothing on success and always exits 0.

pub mod templates;

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::format::{Format, Template};
use crate::go::ast::ImportSpec;
use crate::go::is_identifier;
use crate::go::literal::{quote, quote_bytes};

use templates::DecodeStep;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoImport {
    pub alias: String,
    pub path: String,
}

impl GoImport {
    pub fn new(alias: &str, path: &str) -> Self {
        GoImport {
            alias: alias.to_string(),
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoRequirement {
    pub path: &'static str,
    pub version: &'static str,
}

/// Input data embedded in the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw file contents for the document formats.
    Text(Vec<u8>),
    /// Flat key/value pairs for the environment template.
    Env(BTreeMap<String, String>),
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub format: Format,
    pub root_type: &'a str,
    /// Rendered declarations in closure order.
    pub declarations: &'a [String],
    /// Imports referenced by the declarations.
    pub imports: &'a [ImportSpec],
    pub payload: &'a Payload,
    pub input_file_name: &'a str,
    pub marker: &'a str,
}

#[derive(Debug, Clone)]
pub struct SynthesizedProgram {
    pub template: Template,
    pub source: String,
    pub requirements: Vec<GoRequirement>,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub imports: BTreeSet<GoImport>,
    pub marker: String,
    pub input_file_name: String,
    pub payload: Payload,
    pub type_decls: Vec<String>,
    pub root_type: String,
    pub decode: DecodeStep,
}

pub fn synthesize(req: &SynthesisRequest<'_>) -> Result<SynthesizedProgram, Diagnostic> {
    let template = req.format.template();
    let program = lower(req, template).map_err(|msg| {
        Diagnostic::error(
            DiagnosticCode::VF0350SynthesisFailed,
            format!("synthesizing {template} program: {msg}", template = template.name()),
        )
    })?;
    let source = program.render();
    tracing::debug!(
        template = template.name(),
        types = program.type_decls.len(),
        bytes = source.len(),
        "synthesized validation program"
    );
    Ok(SynthesizedProgram {
        template,
        source,
        requirements: templates::requirements(template),
    })
}

fn lower(req: &SynthesisRequest<'_>, template: Template) -> Result<Program, String> {
    if !is_identifier(req.root_type) {
        return Err(format!("invalid root type name {:?}", req.root_type));
    }
    match (template, req.payload) {
        (Template::Env, Payload::Env(_)) => {}
        (Template::Env, Payload::Text(_)) => {
            return Err("environment template needs key/value input".to_string())
        }
        (_, Payload::Env(_)) => return Err("document template needs text input".to_string()),
        (_, Payload::Text(_)) => {}
    }

    let decode = templates::decode_step(template);
    let mut imports: BTreeSet<GoImport> = templates::common_imports().into_iter().collect();
    imports.extend(decode.imports.iter().cloned());
    for spec in req.imports {
        let alias = spec
            .local_name()
            .ok_or_else(|| format!("import {:?} has no usable name", spec.path))?;
        if alias.starts_with("valfile") {
            return Err(format!("import name {alias} is reserved"));
        }
        imports.insert(GoImport::new(alias, &spec.path));
    }

    Ok(Program {
        imports,
        marker: req.marker.to_string(),
        input_file_name: input_file_name(template, req.input_file_name),
        payload: req.payload.clone(),
        type_decls: req.declarations.to_vec(),
        root_type: req.root_type.to_string(),
        decode,
    })
}

/// hclsimple picks its syntax from the file name suffix.
fn input_file_name(template: Template, name: &str) -> String {
    if template == Template::Hcl && !name.ends_with(".hcl") {
        return format!("{name}.hcl");
    }
    name.to_string()
}

impl Program {
    pub fn render(&self) -> String {
        let mut e = Emitter::default();
        e.line("// Code generated by valfile. DO NOT EDIT.");
        e.blank();
        e.line("package main");
        e.blank();

        let mut imports: Vec<&GoImport> = self.imports.iter().collect();
        imports.sort_by(|a, b| (&a.path, &a.alias).cmp(&(&b.path, &b.alias)));
        e.open_block("import (", ")");
        for imp in imports {
            e.line(&format!("{} {}", imp.alias, quote(&imp.path)));
        }
        e.close_block();
        e.blank();

        e.line(&format!("const valfileMarker = {}", quote(&self.marker)));
        e.blank();
        e.line(&format!(
            "const valfileInputFileName = {}",
            quote(&self.input_file_name)
        ));
        e.blank();
        match &self.payload {
            Payload::Text(bytes) => {
                e.line(&format!("const valfileInput = {}", quote_bytes(bytes)));
            }
            Payload::Env(vars) => {
                e.open_block("var valfileInput = map[string]string{", "}");
                for (k, v) in vars {
                    e.line(&format!("{}: {},", quote(k), quote(v)));
                }
                e.close_block();
            }
        }

        for decl in &self.type_decls {
            e.blank();
            e.raw(decl);
        }
        e.blank();

        let root = &self.root_type;
        e.open_block("func main() {", "}");
        e.line(&format!("var valfileValue {root}"));
        e.open_block("if err := valfileDecode(&valfileValue); err != nil {", "}");
        e.line("valfileReport(err.Error())");
        e.line("return");
        e.close_block();
        e.line("valfileValidate(&valfileValue)");
        e.close_block();
        e.blank();

        e.open_block("func valfileReport(msg string) {", "}");
        e.line("valfilefmt.Println(valfileMarker + msg)");
        e.close_block();
        e.blank();

        e.open_block(
            &format!("func valfileDecode(valfileTarget *{root}) error {{"),
            "}",
        );
        for l in &self.decode.body {
            e.line(l);
        }
        e.close_block();
        e.blank();

        e.open_block(&format!("func valfileValidate(valfileTarget *{root}) {{"), "}");
        for l in templates::VALIDATE_BODY {
            e.line(l);
        }
        e.close_block();
        e.out
    }
}

/// Line emitter with tab indentation.
#[derive(Debug, Default)]
struct Emitter {
    out: String,
    indent: usize,
    closers: Vec<&'static str>,
}

impl Emitter {
    fn line(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Multi-line text emitted at column zero.
    fn raw(&mut self, text: &str) {
        self.out.push_str(text);
        if !text.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn open_block(&mut self, header: &str, closer: &'static str) {
        self.line(header);
        self.closers.push(closer);
        self.indent += 1;
    }

    fn close_block(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        let closer = self.closers.pop().unwrap_or("}");
        self.line(closer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(
        format: Format,
        decls: &'a [String],
        imports: &'a [ImportSpec],
        payload: &'a Payload,
    ) -> SynthesisRequest<'a> {
        SynthesisRequest {
            format,
            root_type: "Config",
            declarations: decls,
            imports,
            payload,
            input_file_name: "config.in",
            marker: "VALFILE: ",
        }
    }

    fn config_decl() -> Vec<String> {
        vec!["type Config struct {\n\tFoo string `json:\"foo\"`\n}".to_string()]
    }

    #[test]
    fn json_program_shape() {
        let decls = config_decl();
        let payload = Payload::Text(b"{\"foo\":\"bar\"}\n".to_vec());
        let p = synthesize(&request(Format::Json, &decls, &[], &payload)).expect("program");
        let src = &p.source;
        assert!(src.starts_with("// Code generated by valfile. DO NOT EDIT.\n\npackage main\n"));
        assert!(src.contains("\tvalfilejson \"encoding/json\"\n"));
        assert!(src.contains("const valfileMarker = \"VALFILE: \"\n"));
        assert!(src.contains("const valfileInput = \"{\\\"foo\\\":\\\"bar\\\"}\\n\"\n"));
        assert!(src.contains("\ntype Config struct {\n\tFoo string `json:\"foo\"`\n}\n"));
        assert!(src.contains("func valfileDecode(valfileTarget *Config) error {\n\td := valfilejson.NewDecoder("));
        assert!(src.contains("\td.DisallowUnknownFields()\n"));
        assert!(src.contains("\t\tif r := recover(); r != nil {\n"));
        assert_eq!(p.requirements.len(), 1);
        assert_eq!(p.requirements[0].path, "github.com/go-playground/validator/v10");
    }

    #[test]
    fn every_import_is_used_in_every_template() {
        let decls = config_decl();
        let text = Payload::Text(Vec::new());
        let env = Payload::Env(BTreeMap::new());
        for format in [
            Format::Json,
            Format::Yaml,
            Format::Toml,
            Format::Hcl,
            Format::Jsonnet,
            Format::Env,
        ] {
            let payload = if format == Format::Env { &env } else { &text };
            let p = synthesize(&request(format, &decls, &[], payload)).expect("program");
            let program = lower(&request(format, &decls, &[], payload), format.template()).unwrap();
            for imp in &program.imports {
                assert!(
                    p.source.contains(&format!("{}.", imp.alias)),
                    "{format}: import {} unused",
                    imp.alias
                );
            }
        }
    }

    #[test]
    fn env_payload_is_a_sorted_map_literal() {
        let decls = config_decl();
        let mut vars = BTreeMap::new();
        vars.insert("ZED".to_string(), "last".to_string());
        vars.insert("FOO".to_string(), "a \"quoted\"\nvalue".to_string());
        let payload = Payload::Env(vars);
        let p = synthesize(&request(Format::Dotenv, &decls, &[], &payload)).expect("program");
        assert!(p.source.contains(
            "var valfileInput = map[string]string{\n\t\"FOO\": \"a \\\"quoted\\\"\\nvalue\",\n\t\"ZED\": \"last\",\n}\n"
        ));
        assert!(p.source.contains("valfileenv.Options{Environment: valfileInput}"));
        assert_eq!(p.template, Template::Env);
    }

    #[test]
    fn hcl_file_name_keeps_a_known_suffix() {
        let decls = config_decl();
        let payload = Payload::Text(Vec::new());
        let p = synthesize(&request(Format::Hcl, &decls, &[], &payload)).expect("program");
        assert!(p.source.contains("const valfileInputFileName = \"config.in.hcl\"\n"));
        assert_eq!(input_file_name(Template::Hcl, "main.hcl"), "main.hcl");
        assert_eq!(input_file_name(Template::Json, "a.json"), "a.json");
    }

    #[test]
    fn jsonnet_is_evaluated_then_decoded_strictly() {
        let decls = config_decl();
        let payload = Payload::Text(b"{ foo: 'b' + 'ar' }".to_vec());
        let p = synthesize(&request(Format::Jsonnet, &decls, &[], &payload)).expect("program");
        assert_eq!(p.template, Template::Jsonnet);
        assert!(p.source.contains("\tvalfilejsonnet \"github.com/google/go-jsonnet\"\n"));
        assert!(p.source.contains(
            "\tdoc, err := valfilejsonnet.MakeVM().EvaluateAnonymousSnippet(valfileInputFileName, valfileInput)\n"
        ));
        assert!(p.source.contains("\t\treturn valfilefmt.Errorf(\"evaluating Jsonnet: %w\", err)\n"));
        assert!(p.source.contains("\td.DisallowUnknownFields()\n"));
        let paths: Vec<&str> = p.requirements.iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec!["github.com/go-playground/validator/v10", "github.com/google/go-jsonnet"]
        );
    }

    #[test]
    fn user_imports_are_carried_with_explicit_names() {
        let decls = config_decl();
        let imports = vec![
            ImportSpec {
                name: Some("time".into()),
                path: "time".into(),
            },
            ImportSpec {
                name: None,
                path: "github.com/google/uuid".into(),
            },
        ];
        let payload = Payload::Text(Vec::new());
        let p = synthesize(&request(Format::Yaml, &decls, &imports, &payload)).expect("program");
        assert!(p.source.contains("\ttime \"time\"\n"));
        assert!(p.source.contains("\tuuid \"github.com/google/uuid\"\n"));
    }

    #[test]
    fn mismatched_payload_is_a_synthesis_error() {
        let decls = config_decl();
        let payload = Payload::Text(Vec::new());
        let d = synthesize(&request(Format::Env, &decls, &[], &payload)).unwrap_err();
        assert_eq!(d.code, DiagnosticCode::VF0350SynthesisFailed);

        let payload = Payload::Env(BTreeMap::new());
        assert!(synthesize(&request(Format::Toml, &decls, &[], &payload)).is_err());
    }
}
