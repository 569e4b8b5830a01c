use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use jclassfile::attributes::Attribute;
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;
use serde_json::Value;
use serde_sarif::sarif::{Artifact, ArtifactLocation, ArtifactRoles};
use tracing::debug;
use zip::ZipArchive;

use crate::ir::{CallKind, CallSite, Class, Instruction, InstructionKind, Method, MethodAccess};
use crate::opcodes;

/// Snapshot of parsed artifacts and lifted classes for a scan.
pub(crate) struct ScanOutput {
    pub(crate) artifacts: Vec<Artifact>,
    pub(crate) classes: Vec<Class>,
}

pub(crate) fn scan_inputs(input: &Path) -> Result<ScanOutput> {
    let mut output = ScanOutput {
        artifacts: Vec::new(),
        classes: Vec::new(),
    };

    scan_path(input, true, true, &mut output)?;

    Ok(output)
}

fn scan_path(path: &Path, is_input: bool, strict: bool, output: &mut ScanOutput) -> Result<()> {
    if path.is_dir() {
        scan_dir(path, output)?;
        return Ok(());
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    let roles = if is_input {
        Some(vec![
            serde_json::to_value(ArtifactRoles::AnalysisTarget)
                .context("failed to serialize artifact role")?,
        ])
    } else {
        None
    };

    match extension {
        "class" => scan_class_file(path, roles, output),
        "jar" => scan_jar_file(path, roles, output),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn scan_dir(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    // Sorted so output order does not depend on the filesystem.
    entries.sort_by_key(|entry| path_key(entry));

    for entry in entries {
        if entry.is_dir() {
            scan_dir(&entry, output)?;
        } else {
            scan_path(&entry, false, false, output)?;
        }
    }

    Ok(())
}

fn scan_class_file(path: &Path, roles: Option<Vec<Value>>, output: &mut ScanOutput) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let index = push_artifact(path_to_uri(path), data.len() as u64, None, roles, output);
    let class = parse_class(&data, index)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    output.classes.push(class);
    Ok(())
}

fn scan_jar_file(path: &Path, roles: Option<Vec<Value>>, output: &mut ScanOutput) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let jar_len = fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .len();
    let jar_index = push_artifact(path_to_uri(path), jar_len, None, roles, output);

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class") && !name.ends_with("module-info.class") {
            entry_names.push(name);
        }
    }

    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let index = push_artifact(
            jar_entry_uri(path, &name),
            entry.size(),
            Some(jar_index),
            None,
            output,
        );
        let class = parse_class(&data, index)
            .with_context(|| format!("failed to parse {}:{}", path.display(), name))?;
        output.classes.push(class);
    }

    Ok(())
}

fn push_artifact(
    uri: String,
    len: u64,
    parent_index: Option<i64>,
    roles: Option<Vec<Value>>,
    output: &mut ScanOutput,
) -> i64 {
    let location = ArtifactLocation::builder().uri(uri).build();
    let artifact = match (parent_index, roles) {
        (Some(parent_index), Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .roles(roles)
            .build(),
        (Some(parent_index), None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .build(),
        (None, Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .roles(roles)
            .build(),
        (None, None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .build(),
    };
    let index = output.artifacts.len() as i64;
    output.artifacts.push(artifact);
    index
}

/// Lift a class file into the IR.
pub(crate) fn parse_class(data: &[u8], artifact_index: i64) -> Result<Class> {
    let class_file = class_file::parse(data).map_err(|err| anyhow::anyhow!("{err:?}"))?;
    let pool = class_file.constant_pool();
    let name = resolve_class_name(pool, class_file.this_class())?;

    let mut methods = Vec::new();
    for method in class_file.methods() {
        let method_name = resolve_utf8(pool, method.name_index())?;
        let descriptor = resolve_utf8(pool, method.descriptor_index())?;
        let instructions = match code_attribute(method.attributes()) {
            Some(code) => parse_instructions(pool, code)
                .with_context(|| format!("failed to decode {name}.{method_name}{descriptor}"))?,
            None => Vec::new(),
        };
        methods.push(Method {
            name: method_name,
            descriptor,
            access: MethodAccess {
                flags: method.access_flags().bits(),
            },
            instructions,
        });
    }

    debug!(class = %name, methods = methods.len(), "lifted class");
    Ok(Class {
        name,
        methods,
        artifact_index,
    })
}

fn code_attribute(attributes: &[Attribute]) -> Option<&[u8]> {
    attributes.iter().find_map(|attribute| match attribute {
        Attribute::Code { code, .. } => Some(code.as_slice()),
        _ => None,
    })
}

fn parse_instructions(pool: &[ConstantPool], code: &[u8]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        let length = opcodes::opcode_length(code, offset)?;
        let kind = match CallKind::from_opcode(opcode) {
            Some(call_kind) => {
                let index = opcodes::read_u16(code, offset + 1)?;
                let (owner, name, descriptor) = resolve_method_ref(pool, index)?;
                InstructionKind::Invoke(CallSite {
                    owner,
                    name,
                    descriptor,
                    kind: call_kind,
                    offset: offset as u32,
                })
            }
            None => InstructionKind::Other,
        };
        instructions.push(Instruction {
            offset: offset as u32,
            opcode,
            kind,
        });
        offset += length;
    }
    Ok(instructions)
}

fn resolve_method_ref(pool: &[ConstantPool], index: u16) -> Result<(String, String, String)> {
    let (class_index, name_and_type_index) = match pool.get(index as usize) {
        Some(ConstantPool::Methodref {
            class_index,
            name_and_type_index,
        })
        | Some(ConstantPool::InterfaceMethodref {
            class_index,
            name_and_type_index,
        }) => (*class_index, *name_and_type_index),
        _ => anyhow::bail!("constant {index} is not a method reference"),
    };
    let owner = resolve_class_name(pool, class_index)?;
    let (name, descriptor) = match pool.get(name_and_type_index as usize) {
        Some(ConstantPool::NameAndType {
            name_index,
            descriptor_index,
        }) => (
            resolve_utf8(pool, *name_index)?,
            resolve_utf8(pool, *descriptor_index)?,
        ),
        _ => anyhow::bail!("constant {name_and_type_index} is not a name and type"),
    };
    Ok((owner, name, descriptor))
}

fn resolve_class_name(pool: &[ConstantPool], index: u16) -> Result<String> {
    match pool.get(index as usize) {
        Some(ConstantPool::Class { name_index }) => resolve_utf8(pool, *name_index),
        _ => anyhow::bail!("constant {index} is not a class"),
    }
}

fn resolve_utf8(pool: &[ConstantPool], index: u16) -> Result<String> {
    match pool.get(index as usize) {
        Some(ConstantPool::Utf8 { value }) => Ok(value.clone()),
        _ => anyhow::bail!("constant {index} is not utf8"),
    }
}

fn path_to_uri(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn jar_entry_uri(jar_path: &Path, entry_name: &str) -> String {
    format!("jar:{}!/{}", jar_path.to_string_lossy(), entry_name)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
