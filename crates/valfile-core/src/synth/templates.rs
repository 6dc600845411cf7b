//! Per-format decode steps and module requirements of the generated program.
//!
//! Every package the generated program imports is aliased with a `valfile`
//! prefix so user declarations can never shadow it.

use crate::format::Template;

use super::{GoImport, GoRequirement};

const VALIDATOR: GoRequirement = GoRequirement {
    path: "github.com/go-playground/validator/v10",
    version: "v10.22.1",
};
const YAML: GoRequirement = GoRequirement {
    path: "gopkg.in/yaml.v3",
    version: "v3.0.1",
};
const TOML: GoRequirement = GoRequirement {
    path: "github.com/pelletier/go-toml/v2",
    version: "v2.2.3",
};
const HCL: GoRequirement = GoRequirement {
    path: "github.com/hashicorp/hcl/v2",
    version: "v2.22.0",
};
const JSONNET: GoRequirement = GoRequirement {
    path: "github.com/google/go-jsonnet",
    version: "v0.20.0",
};
const ENV: GoRequirement = GoRequirement {
    path: "github.com/caarlos0/env/v11",
    version: "v11.2.2",
};

/// The body of `valfileDecode(valfileTarget *Root) error`. Lines are
/// relative to the function body; nested blocks carry their own tabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeStep {
    pub imports: Vec<GoImport>,
    pub body: Vec<&'static str>,
}

pub fn decode_step(template: Template) -> DecodeStep {
    match template {
        Template::Json => DecodeStep {
            imports: vec![
                GoImport::new("valfilejson", "encoding/json"),
                GoImport::new("valfilestrings", "strings"),
            ],
            body: vec![
                "d := valfilejson.NewDecoder(valfilestrings.NewReader(valfileInput))",
                "d.DisallowUnknownFields()",
                "return d.Decode(valfileTarget)",
            ],
        },
        Template::Yaml => DecodeStep {
            imports: vec![
                GoImport::new("valfileyaml", YAML.path),
                GoImport::new("valfilestrings", "strings"),
                GoImport::new("valfileerrors", "errors"),
                GoImport::new("valfileio", "io"),
            ],
            // An empty document decodes to the zero value.
            body: vec![
                "d := valfileyaml.NewDecoder(valfilestrings.NewReader(valfileInput))",
                "d.KnownFields(true)",
                "if err := d.Decode(valfileTarget); err != nil && !valfileerrors.Is(err, valfileio.EOF) {",
                "\treturn err",
                "}",
                "return nil",
            ],
        },
        Template::Toml => DecodeStep {
            imports: vec![
                GoImport::new("valfiletoml", TOML.path),
                GoImport::new("valfilestrings", "strings"),
                GoImport::new("valfileerrors", "errors"),
            ],
            body: vec![
                "d := valfiletoml.NewDecoder(valfilestrings.NewReader(valfileInput))",
                "d.DisallowUnknownFields()",
                "err := d.Decode(valfileTarget)",
                "var strict *valfiletoml.StrictMissingError",
                "if valfileerrors.As(err, &strict) {",
                "\treturn valfileerrors.New(strict.String())",
                "}",
                "var decode *valfiletoml.DecodeError",
                "if valfileerrors.As(err, &decode) {",
                "\treturn valfileerrors.New(decode.String())",
                "}",
                "return err",
            ],
        },
        Template::Hcl => DecodeStep {
            imports: vec![GoImport::new(
                "valfilehclsimple",
                "github.com/hashicorp/hcl/v2/hclsimple",
            )],
            body: vec![
                "return valfilehclsimple.Decode(valfileInputFileName, []byte(valfileInput), nil, valfileTarget)",
            ],
        },
        Template::Jsonnet => DecodeStep {
            imports: vec![
                GoImport::new("valfilejsonnet", JSONNET.path),
                GoImport::new("valfilejson", "encoding/json"),
                GoImport::new("valfilestrings", "strings"),
            ],
            body: vec![
                "doc, err := valfilejsonnet.MakeVM().EvaluateAnonymousSnippet(valfileInputFileName, valfileInput)",
                "if err != nil {",
                "\treturn valfilefmt.Errorf(\"evaluating Jsonnet: %w\", err)",
                "}",
                "d := valfilejson.NewDecoder(valfilestrings.NewReader(doc))",
                "d.DisallowUnknownFields()",
                "return d.Decode(valfileTarget)",
            ],
        },
        Template::Env => DecodeStep {
            imports: vec![GoImport::new("valfileenv", ENV.path)],
            body: vec![
                "return valfileenv.ParseWithOptions(valfileTarget, valfileenv.Options{Environment: valfileInput})",
            ],
        },
    }
}

/// Imports of the fixed part of every program: reporting and validation.
pub fn common_imports() -> Vec<GoImport> {
    vec![
        GoImport::new("valfilefmt", "fmt"),
        GoImport::new("valfileerrors", "errors"),
        GoImport::new("valfilevalidator", VALIDATOR.path),
    ]
}

/// Module requirements for the `go.mod` of a template, sorted by path.
pub fn requirements(template: Template) -> Vec<GoRequirement> {
    let mut reqs = vec![VALIDATOR];
    match template {
        Template::Json => {}
        Template::Yaml => reqs.push(YAML),
        Template::Toml => reqs.push(TOML),
        Template::Hcl => reqs.push(HCL),
        Template::Jsonnet => reqs.push(JSONNET),
        Template::Env => reqs.push(ENV),
    }
    reqs.sort_by(|a, b| a.path.cmp(b.path));
    reqs
}

/// The validation pass. Every field error is its own report line; any panic
/// raised while validating (an unknown rule name in a `validate` tag, for
/// one) is reported instead of crashing the program.
pub const VALIDATE_BODY: &[&str] = &[
    "defer func() {",
    "\tif r := recover(); r != nil {",
    "\t\tvalfileReport(valfilefmt.Sprint(r))",
    "\t}",
    "}()",
    "err := valfilevalidator.New(valfilevalidator.WithRequiredStructEnabled()).Struct(valfileTarget)",
    "if err == nil {",
    "\treturn",
    "}",
    "var fieldErrs valfilevalidator.ValidationErrors",
    "if valfileerrors.As(err, &fieldErrs) {",
    "\tfor _, fe := range fieldErrs {",
    "\t\tvalfileReport(fe.Error())",
    "\t}",
    "\treturn",
    "}",
    "valfileReport(err.Error())",
];
