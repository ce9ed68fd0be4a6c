//! Schema catalog builder.
//!
//! Loads `.proto` files from a root directory at runtime and links them into a
//! [`ProtoSchema`]. The build runs in phases:
//!
//! 1. grammar scan of every file (`protobuf_parse::pure::parse_dependencies`)
//!    to collect imports and report syntax errors with their location,
//! 2. import resolution and dependency ordering,
//! 3. `protobuf_parse` type checking over the ordered inputs,
//! 4. linking: every message and enum gets an index, field types become
//!    [`MessageId`]/[`EnumId`] references.
//!
//! Files are processed by name, so the result does not depend on the order in
//! which they were listed.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use kafka_types::{
    EnumId, FieldKind, MessageId, ProtoEnumDescriptor, ProtoFieldDescriptor,
    ProtoMessageDescriptor, ProtoSchema, ProtoType,
};
use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
};
use protobuf_parse::Parser;
use tracing::{debug, info};

use crate::error::SchemaError;

type Result<T> = std::result::Result<T, SchemaError>;

/// Imports the parser provides without a file on disk.
const EMBEDDED_IMPORTS: &[&str] = &[
    "google/protobuf/any.proto",
    "google/protobuf/api.proto",
    "google/protobuf/descriptor.proto",
    "google/protobuf/duration.proto",
    "google/protobuf/empty.proto",
    "google/protobuf/field_mask.proto",
    "google/protobuf/source_context.proto",
    "google/protobuf/struct.proto",
    "google/protobuf/timestamp.proto",
    "google/protobuf/type.proto",
    "google/protobuf/wrappers.proto",
    "rustproto.proto",
];

/// Builds a [`ProtoSchema`] from `.proto` files under a root directory.
#[derive(Debug, Clone)]
pub struct ProtoParser {
    root: PathBuf,
    files: Vec<String>,
}

impl ProtoParser {
    /// Parser for every `.proto` file under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Vec::new(),
        }
    }

    /// Restrict the build to these files, given relative to the root.
    /// Their on-disk imports are still loaded.
    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.files = files
            .into_iter()
            .map(|f| normalize(f.as_ref()))
            .filter(|f| !f.is_empty())
            .collect();
        self
    }

    /// Parse a single `.proto` source held in memory.
    pub fn from_string(content: &str) -> Result<ProtoSchema> {
        let dir = tempfile::tempdir().map_err(|source| SchemaError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
        let path = dir.path().join("schema.proto");
        fs::write(&path, content).map_err(|source| SchemaError::Io { path, source })?;
        ProtoParser::new(dir.path()).parse()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the catalog.
    pub fn parse(&self) -> Result<ProtoSchema> {
        let inputs = if self.files.is_empty() {
            let mut found = Vec::new();
            collect_proto_files(&self.root, &self.root, &mut found)?;
            found.sort();
            if found.is_empty() {
                return Err(SchemaError::NoFiles(self.root.clone()));
            }
            found
        } else {
            for file in &self.files {
                let path = self.root.join(file);
                if !path.is_file() {
                    return Err(SchemaError::FileNotFound(path));
                }
            }
            let mut listed = self.files.clone();
            listed.sort();
            listed.dedup();
            listed
        };
        debug!("Loading {} schema file(s) from {:?}", inputs.len(), self.root);

        let imports = self.scan_imports(&inputs)?;
        let ordered = dependency_order(&inputs, &imports)?;
        let descriptors = self.typecheck(&ordered)?;
        let schema = link(&descriptors)?;

        info!(
            "Loaded {} message type(s) from {} file(s) under {:?}",
            schema.message_count(),
            ordered.len(),
            self.root
        );
        Ok(schema)
    }

    /// Grammar-level pass: syntax errors and the on-disk import graph.
    fn scan_imports(&self, inputs: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let mut graph = HashMap::new();
        let mut pending: Vec<String> = inputs.to_vec();

        while let Some(file) = pending.pop() {
            if graph.contains_key(&file) {
                continue;
            }
            let path = self.root.join(&file);
            let content =
                fs::read_to_string(&path).map_err(|source| SchemaError::Io { path, source })?;
            let parsed = protobuf_parse::pure::parse_dependencies(&content).map_err(|e| {
                SchemaError::Parse {
                    file: file.clone(),
                    line: e.line,
                    column: e.col,
                    message: e.error.to_string(),
                }
            })?;

            let mut deps = Vec::new();
            for import in parsed.dependency {
                if self.root.join(&import).is_file() {
                    pending.push(import.clone());
                    deps.push(import);
                } else if !EMBEDDED_IMPORTS.contains(&import.as_str()) {
                    return Err(SchemaError::UnresolvedImport {
                        file: file.clone(),
                        import,
                    });
                }
            }
            graph.insert(file, deps);
        }

        Ok(graph)
    }

    fn typecheck(&self, ordered: &[String]) -> Result<Vec<FileDescriptorProto>> {
        let mut parser = Parser::new();
        parser
            .pure()
            .include(&self.root)
            .inputs(ordered.iter().map(|f| self.root.join(f)));
        let parsed = parser
            .parse_and_typecheck()
            .map_err(|e| SchemaError::Typecheck(format!("{e:#}")))?;
        Ok(parsed.file_descriptors)
    }
}

fn normalize(file: &str) -> String {
    let file = file.trim().replace('\\', "/");
    file.strip_prefix("./").unwrap_or(&file).to_string()
}

fn collect_proto_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|source| SchemaError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let path = entry
            .map_err(|source| SchemaError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_dir() {
            collect_proto_files(root, &path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "proto") {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(normalize(&relative.to_string_lossy()));
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Dependencies-first order over `inputs` and everything they import.
fn dependency_order(
    inputs: &[String],
    imports: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>> {
    fn visit(
        file: &str,
        imports: &HashMap<String, Vec<String>>,
        marks: &mut HashMap<String, Mark>,
        stack: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(file) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|f| f == file).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(file.to_string());
                return Err(SchemaError::ImportCycle(cycle));
            }
            None => {}
        }

        marks.insert(file.to_string(), Mark::Visiting);
        stack.push(file.to_string());
        for dep in imports.get(file).into_iter().flatten() {
            visit(dep, imports, marks, stack, order)?;
        }
        stack.pop();
        marks.insert(file.to_string(), Mark::Done);
        order.push(file.to_string());
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut order = Vec::new();
    for file in inputs {
        visit(file, imports, &mut marks, &mut Vec::new(), &mut order)?;
    }
    Ok(order)
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

fn is_map_entry(message: &DescriptorProto) -> bool {
    message
        .options
        .as_ref()
        .is_some_and(|options| options.map_entry())
}

/// Every declaration found in the typechecked files, before linking.
#[derive(Default)]
struct Declarations<'a> {
    origins: HashMap<String, String>,
    messages: Vec<(String, &'a str, &'a DescriptorProto)>,
    enums: Vec<(String, &'a EnumDescriptorProto)>,
    map_entries: HashMap<String, &'a DescriptorProto>,
}

impl<'a> Declarations<'a> {
    fn declare(&mut self, name: &str, file: &str) -> Result<()> {
        if let Some(first) = self.origins.get(name) {
            return Err(SchemaError::DuplicateType {
                name: name.to_string(),
                first: first.clone(),
                second: file.to_string(),
            });
        }
        self.origins.insert(name.to_string(), file.to_string());
        Ok(())
    }

    fn add_messages(
        &mut self,
        scope: &str,
        file: &'a str,
        messages: &'a [DescriptorProto],
    ) -> Result<()> {
        for message in messages {
            let name = qualify(scope, message.name());
            if is_map_entry(message) {
                self.map_entries.insert(name, message);
                continue;
            }
            self.declare(&name, file)?;
            self.messages.push((name.clone(), file, message));
            self.add_enums(&name, file, &message.enum_type)?;
            self.add_messages(&name, file, &message.nested_type)?;
        }
        Ok(())
    }

    fn add_enums(
        &mut self,
        scope: &str,
        file: &'a str,
        enums: &'a [EnumDescriptorProto],
    ) -> Result<()> {
        for enumeration in enums {
            let name = qualify(scope, enumeration.name());
            self.declare(&name, file)?;
            self.enums.push((name, enumeration));
        }
        Ok(())
    }
}

/// Resolves field types against the registered names.
struct Linker<'a> {
    messages: HashMap<&'a str, MessageId>,
    enums: HashMap<&'a str, EnumId>,
    map_entries: &'a HashMap<String, &'a DescriptorProto>,
}

impl Linker<'_> {
    fn field_kind(&self, owner: &str, field: &FieldDescriptorProto) -> Result<FieldKind> {
        let repeated = field.label == Some(Label::LABEL_REPEATED.into());
        if repeated && field_type(owner, field)? == Type::TYPE_MESSAGE {
            let target = field.type_name().trim_start_matches('.');
            if let Some(entry) = self.map_entries.get(target) {
                let entry_field = |number: i32| {
                    entry
                        .field
                        .iter()
                        .find(|f| f.number() == number)
                        .ok_or_else(|| {
                            SchemaError::Typecheck(format!(
                                "map entry {target} has no field {number}"
                            ))
                        })
                };
                return Ok(FieldKind::Map {
                    key: self.value_type(target, entry_field(1)?)?,
                    value: self.value_type(target, entry_field(2)?)?,
                });
            }
        }

        let value_type = self.value_type(owner, field)?;
        Ok(if repeated {
            FieldKind::Repeated(value_type)
        } else {
            FieldKind::Singular(value_type)
        })
    }

    fn value_type(&self, owner: &str, field: &FieldDescriptorProto) -> Result<ProtoType> {
        Ok(match field_type(owner, field)? {
            Type::TYPE_DOUBLE => ProtoType::Double,
            Type::TYPE_FLOAT => ProtoType::Float,
            Type::TYPE_INT64 => ProtoType::Int64,
            Type::TYPE_UINT64 => ProtoType::Uint64,
            Type::TYPE_INT32 => ProtoType::Int32,
            Type::TYPE_FIXED64 => ProtoType::Fixed64,
            Type::TYPE_FIXED32 => ProtoType::Fixed32,
            Type::TYPE_BOOL => ProtoType::Bool,
            Type::TYPE_STRING => ProtoType::String,
            Type::TYPE_BYTES => ProtoType::Bytes,
            Type::TYPE_UINT32 => ProtoType::Uint32,
            Type::TYPE_SFIXED32 => ProtoType::Sfixed32,
            Type::TYPE_SFIXED64 => ProtoType::Sfixed64,
            Type::TYPE_SINT32 => ProtoType::Sint32,
            Type::TYPE_SINT64 => ProtoType::Sint64,
            Type::TYPE_MESSAGE => {
                let target = field.type_name().trim_start_matches('.');
                let id = self
                    .messages
                    .get(target)
                    .ok_or_else(|| dangling(owner, field))?;
                ProtoType::Message(*id)
            }
            Type::TYPE_ENUM => {
                let target = field.type_name().trim_start_matches('.');
                let id = self
                    .enums
                    .get(target)
                    .ok_or_else(|| dangling(owner, field))?;
                ProtoType::Enum(*id)
            }
            Type::TYPE_GROUP => {
                return Err(SchemaError::Typecheck(format!(
                    "{owner}.{}: group fields are proto2-only and not supported",
                    field.name()
                )))
            }
        })
    }
}

fn field_type(owner: &str, field: &FieldDescriptorProto) -> Result<Type> {
    field
        .type_
        .map(|t| t.enum_value_or_default())
        .ok_or_else(|| {
            SchemaError::Typecheck(format!("{owner}.{}: field has no type", field.name()))
        })
}

fn dangling(owner: &str, field: &FieldDescriptorProto) -> SchemaError {
    SchemaError::DanglingReference {
        message: owner.to_string(),
        field: field.name().to_string(),
        type_name: field.type_name().trim_start_matches('.').to_string(),
    }
}

/// Register every declaration, then turn type names into indices.
fn link(files: &[FileDescriptorProto]) -> Result<ProtoSchema> {
    let mut declared = Declarations::default();
    for file in files {
        declared.add_enums(file.package(), file.name(), &file.enum_type)?;
        declared.add_messages(file.package(), file.name(), &file.message_type)?;
    }

    let linker = Linker {
        messages: declared
            .messages
            .iter()
            .enumerate()
            .map(|(i, (name, _, _))| (name.as_str(), MessageId(i)))
            .collect(),
        enums: declared
            .enums
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.as_str(), EnumId(i)))
            .collect(),
        map_entries: &declared.map_entries,
    };

    let mut messages = Vec::with_capacity(declared.messages.len());
    for (name, file, proto) in &declared.messages {
        let mut numbers = HashSet::new();
        let mut fields = Vec::with_capacity(proto.field.len());
        for field in &proto.field {
            let number = u32::try_from(field.number()).map_err(|_| {
                SchemaError::Typecheck(format!(
                    "{name}.{}: invalid field number {}",
                    field.name(),
                    field.number()
                ))
            })?;
            if !numbers.insert(number) {
                return Err(SchemaError::DuplicateFieldNumber {
                    message: name.clone(),
                    number,
                });
            }
            fields.push(ProtoFieldDescriptor {
                name: field.name().to_string(),
                number,
                kind: linker.field_kind(name, field)?,
            });
        }
        messages.push(ProtoMessageDescriptor::new(
            name.clone(),
            file.to_string(),
            fields,
        ));
    }

    let enums = declared
        .enums
        .iter()
        .map(|(name, proto)| ProtoEnumDescriptor {
            name: name.clone(),
            values: proto
                .value
                .iter()
                .map(|v| (v.name().to_string(), v.number()))
                .collect(),
        })
        .collect();

    Ok(ProtoSchema::from_parts(messages, enums))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_simple_message() {
        let proto = r#"
            syntax = "proto3";

            message User {
                string name = 1;
                int32 age = 2;
                bool active = 3;
            }
        "#;

        let schema = ProtoParser::from_string(proto).expect("Failed to parse proto");
        assert_eq!(schema.message_count(), 1);

        let user_msg = schema.resolve("User").expect("User message not found");
        assert_eq!(user_msg.list_fields(), vec!["name", "age", "active"]);

        let name_field = user_msg.get_field("name").expect("name field not found");
        assert_eq!(name_field.number, 1);
        assert_eq!(name_field.kind, FieldKind::Singular(ProtoType::String));

        let age_field = user_msg.get_field("age").expect("age field not found");
        assert_eq!(age_field.kind, FieldKind::Singular(ProtoType::Int32));

        let active_field = user_msg.get_field("active").expect("active field not found");
        assert_eq!(active_field.kind, FieldKind::Singular(ProtoType::Bool));
    }

    #[test]
    fn test_parse_with_package_and_nesting() {
        let proto = r#"
            syntax = "proto3";
            package myapp.v1;

            message Product {
                message Price {
                    double amount = 1;
                    Currency currency = 2;
                }
                enum Currency {
                    USD = 0;
                    EUR = 1;
                }
                string id = 1;
                Price price = 2;
                repeated string tags = 3;
            }
        "#;

        let schema = ProtoParser::from_string(proto).expect("Failed to parse proto");
        assert_eq!(
            schema.list_messages(),
            vec!["myapp.v1.Product", "myapp.v1.Product.Price"]
        );

        let product = schema.resolve("myapp.v1.Product").unwrap();
        let price_id = match product.get_field("price").unwrap().kind {
            FieldKind::Singular(ProtoType::Message(id)) => id,
            ref other => panic!("unexpected kind {other:?}"),
        };
        assert_eq!(schema.message(price_id).name, "myapp.v1.Product.Price");
        assert_eq!(
            product.get_field("tags").unwrap().kind,
            FieldKind::Repeated(ProtoType::String)
        );

        let currency = schema.get_enum("myapp.v1.Product.Currency").unwrap();
        assert_eq!(currency.value_name(1), Some("EUR"));

        // Bare names are not fully qualified
        assert!(schema.resolve("Product").is_err());
    }

    #[test]
    fn test_parse_all_numeric_types() {
        let proto = r#"
            syntax = "proto3";

            message Numbers {
                double d = 1;
                float f = 2;
                int32 i32 = 3;
                int64 i64 = 4;
                uint32 u32 = 5;
                uint64 u64 = 6;
                sint32 s32 = 7;
                sint64 s64 = 8;
                fixed32 f32 = 9;
                fixed64 f64 = 10;
                sfixed32 sf32 = 11;
                sfixed64 sf64 = 12;
                bytes raw = 13;
            }
        "#;

        let schema = ProtoParser::from_string(proto).unwrap();
        let numbers = schema.resolve("Numbers").unwrap();
        let kinds: Vec<_> = numbers.fields.iter().map(|f| f.kind.clone()).collect();
        let expected = [
            ProtoType::Double,
            ProtoType::Float,
            ProtoType::Int32,
            ProtoType::Int64,
            ProtoType::Uint32,
            ProtoType::Uint64,
            ProtoType::Sint32,
            ProtoType::Sint64,
            ProtoType::Fixed32,
            ProtoType::Fixed64,
            ProtoType::Sfixed32,
            ProtoType::Sfixed64,
            ProtoType::Bytes,
        ]
        .map(FieldKind::Singular);
        assert_eq!(kinds, expected.to_vec());
    }

    #[test]
    fn test_map_fields_become_map_kind() {
        let proto = r#"
            syntax = "proto3";
            package pkg;

            message Inventory {
                map<string, int64> counts = 1;
                map<int32, Inventory> children = 2;
            }
        "#;

        let schema = ProtoParser::from_string(proto).unwrap();
        // Synthetic entry messages are not part of the catalog
        assert_eq!(schema.list_messages(), vec!["pkg.Inventory"]);

        let inventory = schema.resolve("pkg.Inventory").unwrap();
        assert_eq!(
            inventory.get_field("counts").unwrap().kind,
            FieldKind::Map {
                key: ProtoType::String,
                value: ProtoType::Int64
            }
        );
        assert_eq!(
            inventory.get_field("children").unwrap().kind,
            FieldKind::Map {
                key: ProtoType::Int32,
                value: ProtoType::Message(MessageId(0))
            }
        );
    }

    #[test]
    fn test_recursive_messages() {
        let proto = r#"
            syntax = "proto3";
            package tree;

            message Node {
                string label = 1;
                repeated Node children = 2;
                Edge parent = 3;
            }

            message Edge {
                Node target = 1;
            }
        "#;

        let schema = ProtoParser::from_string(proto).unwrap();
        let node = schema.resolve("tree.Node").unwrap();
        let edge = schema.resolve("tree.Edge").unwrap();
        assert_eq!(
            node.get_field("children").unwrap().kind,
            FieldKind::Repeated(ProtoType::Message(MessageId(0)))
        );
        assert_eq!(
            edge.get_field("target").unwrap().kind,
            FieldKind::Singular(ProtoType::Message(MessageId(0)))
        );
    }

    #[test]
    fn test_cross_file_import() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "common/money.proto",
            r#"syntax = "proto3";
            package common;
            message Money { int64 cents = 1; }"#,
        );
        write(
            dir.path(),
            "order.proto",
            r#"syntax = "proto3";
            package shop;
            import "common/money.proto";
            import "google/protobuf/timestamp.proto";
            message Order {
                common.Money total = 1;
                google.protobuf.Timestamp placed_at = 2;
            }"#,
        );

        // Only order.proto is listed; its on-disk import is loaded too
        let schema = ProtoParser::new(dir.path())
            .files(["order.proto"])
            .parse()
            .unwrap();
        let order = schema.resolve("shop.Order").unwrap();
        let money = schema.resolve("common.Money").unwrap();
        assert_eq!(money.file, "common/money.proto");
        assert!(schema.resolve("google.protobuf.Timestamp").is_ok());
        assert!(matches!(
            order.get_field("total").unwrap().kind,
            FieldKind::Singular(ProtoType::Message(_))
        ));
    }

    #[test]
    fn test_directory_order_is_irrelevant() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.proto",
            r#"syntax = "proto3"; package p; import "z.proto"; message A { Z z = 1; }"#,
        );
        write(
            dir.path(),
            "z.proto",
            r#"syntax = "proto3"; package p; message Z { int32 v = 1; }"#,
        );

        let all = ProtoParser::new(dir.path()).parse().unwrap();
        let reversed = ProtoParser::new(dir.path())
            .files(["z.proto", "a.proto"])
            .parse()
            .unwrap();
        assert_eq!(all.list_messages(), vec!["p.A", "p.Z"]);
        assert_eq!(all.list_messages(), reversed.list_messages());
    }

    #[test]
    fn test_unresolved_import() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.proto",
            r#"syntax = "proto3"; import "missing.proto"; message A {}"#,
        );

        let err = ProtoParser::new(dir.path()).parse().unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnresolvedImport { ref file, ref import }
                if file == "a.proto" && import == "missing.proto"
        ));
    }

    #[test]
    fn test_duplicate_type_across_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.proto",
            r#"syntax = "proto3"; package pkg; message Foo { int32 a = 1; }"#,
        );
        write(
            dir.path(),
            "b.proto",
            r#"syntax = "proto3"; package pkg; message Foo { string b = 1; }"#,
        );

        let err = ProtoParser::new(dir.path()).parse().unwrap_err();
        match err {
            SchemaError::DuplicateType { name, first, second } => {
                assert_eq!(name, "pkg.Foo");
                assert_eq!(first, "a.proto");
                assert_eq!(second, "b.proto");
            }
            other => panic!("expected DuplicateType, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_has_location() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "broken.proto",
            "syntax = \"proto3\";\nmessage Foo {\n  int32 field1 = ;\n}\n",
        );

        let err = ProtoParser::new(dir.path()).parse().unwrap_err();
        match err {
            SchemaError::Parse { file, line, .. } => {
                assert_eq!(file, "broken.proto");
                assert_eq!(line, 3);
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_import_cycle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.proto",
            r#"syntax = "proto3"; import "b.proto"; message A {}"#,
        );
        write(
            dir.path(),
            "b.proto",
            r#"syntax = "proto3"; import "a.proto"; message B {}"#,
        );

        let err = ProtoParser::new(dir.path()).parse().unwrap_err();
        match err {
            SchemaError::ImportCycle(cycle) => {
                assert_eq!(cycle, vec!["a.proto", "b.proto", "a.proto"]);
            }
            other => panic!("expected ImportCycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_reference() {
        let err = ProtoParser::from_string(
            r#"syntax = "proto3"; message Foo { Missing thing = 1; }"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Typecheck(_)), "{err:?}");
    }

    #[test]
    fn test_missing_listed_file_and_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ProtoParser::new(dir.path()).parse(),
            Err(SchemaError::NoFiles(_))
        ));
        assert!(matches!(
            ProtoParser::new(dir.path()).files(["nope.proto"]).parse(),
            Err(SchemaError::FileNotFound(_))
        ));
    }
}
