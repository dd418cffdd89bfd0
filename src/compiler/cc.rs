//! Native toolchain driver: writes the emitted IR plus the bundled C runtime
//! to temp files, links them with clang, and runs the result.
//!
//! The C runtime implements the fixed ABI the generated IR declares. It ships
//! embedded in the crate so compiled programs are self-contained; an external
//! implementation can be substituted with `--runtime-lib`.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const RUNTIME_C: &str = r#"#include <stdarg.h>
#include <stdbool.h>
#include <stdint.h>
#include <stdio.h>
#include <stdlib.h>
#include <string.h>
#include <sys/types.h>

typedef struct {
    int64_t length;
    char *data;
} Array;

void culebra_print_int(int64_t value) {
    printf("%lld\n", (long long)value);
}

void culebra_print_float(double value) {
    printf("%g\n", value);
}

void culebra_print_string(char *value) {
    printf("%s\n", value ? value : "");
}

void culebra_print_bool(bool value) {
    printf("%s\n", value ? "true" : "false");
}

void culebra_print_multi(int count, ...) {
    va_list args;
    va_start(args, count);
    for (int i = 0; i < count; i++) {
        if (i > 0) {
            printf(" ");
        }
        char *value = va_arg(args, char *);
        printf("%s", value ? value : "");
    }
    printf("\n");
    va_end(args);
}

char *culebra_input(char *prompt) {
    if (prompt != NULL && prompt[0] != '\0') {
        printf("%s", prompt);
        fflush(stdout);
    }
    char *line = NULL;
    size_t capacity = 0;
    ssize_t length = getline(&line, &capacity, stdin);
    if (length == -1) {
        free(line);
        return strdup("");
    }
    while (length > 0 && (line[length - 1] == '\n' || line[length - 1] == '\r')) {
        line[--length] = '\0';
    }
    return line;
}

int64_t culebra_len(char *value) {
    if (value == NULL) {
        return 0;
    }
    return (int64_t)strlen(value);
}

int64_t culebra_len_array(Array *array) {
    if (array == NULL) {
        return 0;
    }
    return array->length;
}

char *culebra_chr(int64_t code) {
    char *result = malloc(2);
    result[0] = (char)code;
    result[1] = '\0';
    return result;
}

int64_t culebra_ord(char *value) {
    if (value == NULL || value[0] == '\0') {
        return 0;
    }
    return (int64_t)(unsigned char)value[0];
}

char *culebra_str_concat(char *left, char *right) {
    if (left == NULL) {
        left = "";
    }
    if (right == NULL) {
        right = "";
    }
    size_t left_length = strlen(left);
    size_t right_length = strlen(right);
    char *result = malloc(left_length + right_length + 1);
    memcpy(result, left, left_length);
    memcpy(result + left_length, right, right_length + 1);
    return result;
}

char *culebra_int_to_str(int64_t value) {
    char *buffer = malloc(32);
    snprintf(buffer, 32, "%lld", (long long)value);
    return buffer;
}

char *culebra_float_to_str(double value) {
    char *buffer = malloc(32);
    snprintf(buffer, 32, "%g", value);
    return buffer;
}

char *culebra_bool_to_str(bool value) {
    return strdup(value ? "true" : "false");
}

Array *culebra_create_array(int64_t length, int64_t element_size) {
    Array *array = malloc(sizeof(Array));
    array->length = length;
    array->data = calloc((size_t)length, (size_t)element_size);
    return array;
}

void *culebra_array_get(Array *array, int64_t index) {
    if (array == NULL || index < 0 || index >= array->length) {
        fprintf(stderr, "IndexError: array index out of bounds: %lld\n", (long long)index);
        exit(1);
    }
    return array->data + (index * 8);
}

void culebra_array_set(Array *array, int64_t index, int64_t value) {
    if (array == NULL || index < 0 || index >= array->length) {
        fprintf(stderr, "IndexError: array index out of bounds: %lld\n", (long long)index);
        exit(1);
    }
    ((int64_t *)array->data)[index] = value;
}
"#;

fn temp_paths(extension: &str) -> Result<(PathBuf, PathBuf)> {
    let mut dir = std::env::temp_dir();
    dir.push("culebra");
    fs::create_dir_all(&dir).context("Creating temp directory")?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let stem = format!("culebra_{nanos}");
    let source_path = dir.join(format!("{stem}.{extension}"));
    let binary_path = dir.join(stem);
    Ok((source_path, binary_path))
}

pub(crate) fn write_temp_ir(ir: &str) -> Result<PathBuf> {
    let (ir_path, _) = temp_paths("ll")?;
    fs::write(&ir_path, ir).context("Writing LLVM IR")?;
    Ok(ir_path)
}

/// Write the IR to a temp file and link it against the runtime, producing a
/// temp binary. Returns the IR and binary paths; the caller owns cleanup.
pub(super) fn compile_ir(
    ir: &str,
    optimize: bool,
    runtime_lib: Option<&Path>,
) -> Result<(PathBuf, PathBuf)> {
    let (ir_path, binary_path) = temp_paths("ll")?;
    fs::write(&ir_path, ir).context("Writing LLVM IR")?;
    let result = link_with_runtime(&ir_path, &binary_path, optimize, runtime_lib);
    if result.is_err() {
        let _ = fs::remove_file(&ir_path);
    }
    result.map(|()| (ir_path, binary_path))
}

/// Link the IR at `ir_path` into an executable at `output`.
pub(crate) fn link_with_runtime(
    ir_path: &Path,
    output: &Path,
    optimize: bool,
    runtime_lib: Option<&Path>,
) -> Result<()> {
    let (runtime_path, bundled) = match runtime_lib {
        Some(path) => (path.to_path_buf(), false),
        None => {
            let (path, _) = temp_paths("c")?;
            fs::write(&path, RUNTIME_C).context("Writing bundled C runtime")?;
            (path, true)
        }
    };

    let compile = Command::new("clang")
        .arg(ir_path)
        .arg(&runtime_path)
        .arg(if optimize { "-O2" } else { "-O0" })
        .arg("-Wno-override-module")
        .arg("-o")
        .arg(output)
        .output()
        .context("Running clang")?;
    if bundled {
        let _ = fs::remove_file(&runtime_path);
    }
    if !compile.status.success() {
        let stderr = String::from_utf8_lossy(&compile.stderr);
        bail!("Native compilation failed: {stderr}");
    }
    Ok(())
}

pub(crate) fn run_compiled_binary(binary_path: &Path, run_error: &str) -> Result<String> {
    let output = Command::new(binary_path)
        .output()
        .context("Running compiled program")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{run_error}: {stderr}");
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
