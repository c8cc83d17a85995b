//! Container command construction.
//!
//! The wrapped tool's command line is described by [`ARGUMENTS`], a table mapping logical
//! parameters to StringTie flags. Every parameter that refers to a file gets its own volume
//! mount, numbered in table order.

use std::{
    fmt::{self, Write as _},
    path::{Path, PathBuf},
};

use crate::{
    exec_method::Backend,
    path::{OutputLayout, ResolvedPath},
};

/// The name of the wrapped tool.
pub const TOOL: &str = "stringtie";

/// The pinned container image that provides [`TOOL`].
pub const IMAGE: &str = "quay.io/biocontainers/stringtie:2.2.1--hecb563c_2";

const MOUNT_PREFIX: &str = "/data";

/// A logical value passed to the wrapped tool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Value {
    /// The annotations (GTF) file.
    Annotations,
    /// The alignments (BAM) file.
    Alignments,
    /// An output artifact named `<output base name>.<suffix>` in the output directory.
    Artifact(&'static str),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Argument {
    /// A flag without a value.
    Flag(&'static str),
    /// A flag followed by a value.
    Option(&'static str, Value),
    /// A bare value.
    Positional(Value),
}

/// The StringTie command line, in order.
pub const ARGUMENTS: &[Argument] = &[
    Argument::Option("-G", Value::Annotations),
    // strand orientation: fr-firststrand
    Argument::Flag("--rf"),
    // expression estimation only
    Argument::Flag("-e"),
    // Ballgown table output
    Argument::Flag("-B"),
    Argument::Option("-o", Value::Artifact("gtf")),
    // gene abundance (coverage) table
    Argument::Option("-A", Value::Artifact("gene_abund.tab")),
    Argument::Positional(Value::Alignments),
];

/// A host directory bound to a container path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MountSpec {
    host_directory: PathBuf,
    container_path: String,
}

impl MountSpec {
    pub fn new<P>(host_directory: P, container_path: String) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            host_directory: host_directory.into(),
            container_path,
        }
    }

    pub fn host_directory(&self) -> &Path {
        &self.host_directory
    }

    pub fn container_path(&self) -> &str {
        &self.container_path
    }

    /// Formats the mount as the value of Docker's `--mount` option.
    ///
    /// Fields are CSV; a field containing a comma or double quote is quoted.
    pub fn to_bind_option(&self) -> String {
        let source = csv_field("source", &self.host_directory.to_string_lossy());
        let target = csv_field("target", &self.container_path);
        format!("type=bind,{source},{target}")
    }
}

fn csv_field(key: &str, value: &str) -> String {
    let field = format!("{key}={value}");

    if field.contains([',', '"']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field
    }
}

/// The resolved paths of a run.
#[derive(Clone, Copy, Debug)]
pub struct Inputs<'a> {
    pub bam: &'a ResolvedPath,
    pub gtf: &'a ResolvedPath,
    pub output: &'a ResolvedPath,
}

#[derive(Default)]
struct Mounts(Vec<MountSpec>);

impl Mounts {
    /// Mounts `host_directory` at the next free slot and returns the slot.
    fn mount(&mut self, host_directory: &Path) -> String {
        let container_path = format!("{MOUNT_PREFIX}{}", self.0.len() + 1);
        self.0.push(MountSpec::new(host_directory, container_path.clone()));
        container_path
    }
}

/// Translates `arguments` into the tool's argument list, mounting every referenced path.
pub fn translate(arguments: &[Argument], inputs: Inputs<'_>) -> (Vec<String>, Vec<MountSpec>) {
    let mut mounts = Mounts::default();
    let mut args = vec![String::from(TOOL)];

    for argument in arguments {
        match *argument {
            Argument::Flag(flag) => args.push(flag.into()),
            Argument::Option(flag, value) => {
                args.push(flag.into());
                args.push(translate_value(value, inputs, &mut mounts));
            }
            Argument::Positional(value) => {
                args.push(translate_value(value, inputs, &mut mounts));
            }
        }
    }

    (args, mounts.0)
}

fn translate_value(value: Value, inputs: Inputs<'_>, mounts: &mut Mounts) -> String {
    match value {
        Value::Annotations => {
            let container_path = mounts.mount(inputs.gtf.directory());
            format!("{container_path}/{}", inputs.gtf.base_name())
        }
        Value::Alignments => {
            let container_path = mounts.mount(inputs.bam.directory());
            format!("{container_path}/{}", inputs.bam.base_name())
        }
        Value::Artifact(suffix) => {
            let container_path = mounts.mount(inputs.output.directory());
            let base_name = inputs.output.base_name();
            format!("{container_path}/{base_name}/{base_name}.{suffix}")
        }
    }
}

/// A fully assembled invocation of the wrapped tool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExternalCommand {
    backend: Backend,
    image: &'static str,
    mounts: Vec<MountSpec>,
    args: Vec<String>,
    stdout_log: PathBuf,
    stderr_log: PathBuf,
}

impl ExternalCommand {
    /// Builds the command that runs the tool with `backend`.
    pub fn build(backend: Backend, inputs: Inputs<'_>, layout: &OutputLayout) -> Self {
        let (args, mounts) = translate(ARGUMENTS, inputs);

        let log_prefix = format!("{}.{TOOL}", layout.output().base_name());
        let stdout_log = layout.log_directory().join(format!("{log_prefix}.stdout"));
        let stderr_log = layout.log_directory().join(format!("{log_prefix}.stderr"));

        Self {
            backend,
            image: IMAGE,
            mounts,
            args,
            stdout_log,
            stderr_log,
        }
    }

    pub fn program(&self) -> &'static str {
        self.backend.program()
    }

    /// Returns the backend arguments, i.e., everything after the program.
    pub fn backend_args(&self) -> Vec<String> {
        match self.backend {
            Backend::Docker => {
                let mut args = vec![String::from("run"), String::from("--rm")];

                for mount in &self.mounts {
                    args.push(String::from("--mount"));
                    args.push(mount.to_bind_option());
                }

                args.push(self.image.into());
                args.extend(self.args.iter().cloned());

                args
            }
        }
    }

    pub fn mounts(&self) -> &[MountSpec] {
        &self.mounts
    }

    /// Returns the tool's argument list, starting with the tool name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn stdout_log(&self) -> &Path {
        &self.stdout_log
    }

    pub fn stderr_log(&self) -> &Path {
        &self.stderr_log
    }
}

impl fmt::Display for ExternalCommand {
    /// Formats the command as a POSIX shell command line, with its redirections.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())?;

        for arg in self.backend_args() {
            f.write_char(' ')?;
            f.write_str(&quote(&arg))?;
        }

        let stdout_log = self.stdout_log.to_string_lossy();
        let stderr_log = self.stderr_log.to_string_lossy();

        write!(f, " > {} 2> {}", quote(&stdout_log), quote(&stderr_log))
    }
}

/// Quotes `s` for a POSIX shell if it contains anything other than safe characters.
pub fn quote(s: &str) -> String {
    fn is_safe(c: char) -> bool {
        c.is_ascii_alphanumeric() || "%+,-./:=@_".contains(c)
    }

    if !s.is_empty() && s.chars().all(is_safe) {
        return s.into();
    }

    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');

    for c in s.chars() {
        if c == '\'' {
            quoted.push_str(r"'\''");
        } else {
            quoted.push(c);
        }
    }

    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(src: &str) -> ResolvedPath {
        ResolvedPath::try_from(PathBuf::from(src)).unwrap()
    }

    fn build() -> ExternalCommand {
        let bam = resolved("/in/a.bam");
        let gtf = resolved("/in/b.gtf");
        let output = resolved("/out/run1");

        let inputs = Inputs {
            bam: &bam,
            gtf: &gtf,
            output: &output,
        };

        let layout = OutputLayout::new(output.clone());

        ExternalCommand::build(Backend::Docker, inputs, &layout)
    }

    #[test]
    fn test_translate() {
        let bam = resolved("/in/a.bam");
        let gtf = resolved("/ref/b.gtf");
        let output = resolved("/out/run1");

        let inputs = Inputs {
            bam: &bam,
            gtf: &gtf,
            output: &output,
        };

        let arguments = [
            Argument::Positional(Value::Alignments),
            Argument::Flag("-x"),
            Argument::Option("-G", Value::Annotations),
        ];

        let (args, mounts) = translate(&arguments, inputs);

        assert_eq!(args, ["stringtie", "/data1/a.bam", "-x", "-G", "/data2/b.gtf"]);
        assert_eq!(
            mounts,
            [
                MountSpec::new("/in", String::from("/data1")),
                MountSpec::new("/ref", String::from("/data2")),
            ]
        );
    }

    #[test]
    fn test_build() {
        let command = build();

        let host_directories: Vec<_> = command
            .mounts()
            .iter()
            .map(|mount| mount.host_directory())
            .collect();

        assert_eq!(
            host_directories,
            [
                Path::new("/in"),
                Path::new("/out"),
                Path::new("/out"),
                Path::new("/in")
            ]
        );

        assert_eq!(
            command.args(),
            [
                "stringtie",
                "-G",
                "/data1/b.gtf",
                "--rf",
                "-e",
                "-B",
                "-o",
                "/data2/run1/run1.gtf",
                "-A",
                "/data3/run1/run1.gene_abund.tab",
                "/data4/a.bam",
            ]
        );

        assert_eq!(
            command.stdout_log(),
            Path::new("/out/_log/run1.stringtie.stdout")
        );
        assert_eq!(
            command.stderr_log(),
            Path::new("/out/_log/run1.stringtie.stderr")
        );
    }

    #[test]
    fn test_backend_args() {
        let command = build();
        let args = command.backend_args();

        assert_eq!(command.program(), "docker");
        assert_eq!(
            args[..11],
            [
                "run",
                "--rm",
                "--mount",
                "type=bind,source=/in,target=/data1",
                "--mount",
                "type=bind,source=/out,target=/data2",
                "--mount",
                "type=bind,source=/out,target=/data3",
                "--mount",
                "type=bind,source=/in,target=/data4",
                IMAGE,
            ]
        );
        assert_eq!(&args[11..], command.args());
        assert_eq!(args.last().map(String::as_str), Some("/data4/a.bam"));
    }

    #[test]
    fn test_fmt() {
        let expected = "docker run --rm \
            --mount type=bind,source=/in,target=/data1 \
            --mount type=bind,source=/out,target=/data2 \
            --mount type=bind,source=/out,target=/data3 \
            --mount type=bind,source=/in,target=/data4 \
            quay.io/biocontainers/stringtie:2.2.1--hecb563c_2 \
            stringtie -G /data1/b.gtf --rf -e -B \
            -o /data2/run1/run1.gtf -A /data3/run1/run1.gene_abund.tab /data4/a.bam \
            > /out/_log/run1.stringtie.stdout 2> /out/_log/run1.stringtie.stderr";

        assert_eq!(build().to_string(), expected);
        assert_eq!(build().to_string(), build().to_string());
    }

    #[test]
    fn test_to_bind_option() {
        let mount = MountSpec::new("/runs/2024:01", String::from("/data1"));
        assert_eq!(
            mount.to_bind_option(),
            "type=bind,source=/runs/2024:01,target=/data1"
        );

        let mount = MountSpec::new("/runs/a,b", String::from("/data2"));
        assert_eq!(
            mount.to_bind_option(),
            r#"type=bind,"source=/runs/a,b",target=/data2"#
        );

        let mount = MountSpec::new(r#"/runs/"x",y"#, String::from("/data3"));
        assert_eq!(
            mount.to_bind_option(),
            r#"type=bind,"source=/runs/""x"",y",target=/data3"#
        );
    }

    #[test]
    fn test_image_is_pinned() {
        let (_, tag) = IMAGE.rsplit_once(':').unwrap();
        assert_ne!(tag, "latest");
        assert!(tag.starts_with(|c: char| c.is_ascii_digit()));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("/data1/a.bam"), "/data1/a.bam");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("my run"), "'my run'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }
}
