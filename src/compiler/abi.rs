//! Fixed table of runtime symbols the generated IR links against.
//!
//! The emitter declares these once at module top and calls them directly;
//! the C implementations live in `cc::RUNTIME_C`.

pub(super) struct RuntimeFn {
    pub name: &'static str,
    pub ret: &'static str,
    pub params: &'static [&'static str],
    pub variadic: bool,
}

pub(super) const RUNTIME_FUNCTIONS: &[RuntimeFn] = &[
    RuntimeFn {
        name: "culebra_print_int",
        ret: "void",
        params: &["i64"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_print_float",
        ret: "void",
        params: &["double"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_print_string",
        ret: "void",
        params: &["ptr"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_print_bool",
        ret: "void",
        params: &["i1"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_print_multi",
        ret: "void",
        params: &["i32"],
        variadic: true,
    },
    RuntimeFn {
        name: "culebra_input",
        ret: "ptr",
        params: &["ptr"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_len",
        ret: "i64",
        params: &["ptr"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_len_array",
        ret: "i64",
        params: &["ptr"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_chr",
        ret: "ptr",
        params: &["i64"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_ord",
        ret: "i64",
        params: &["ptr"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_str_concat",
        ret: "ptr",
        params: &["ptr", "ptr"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_int_to_str",
        ret: "ptr",
        params: &["i64"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_float_to_str",
        ret: "ptr",
        params: &["double"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_bool_to_str",
        ret: "ptr",
        params: &["i1"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_create_array",
        ret: "ptr",
        params: &["i64", "i64"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_array_get",
        ret: "ptr",
        params: &["ptr", "i64"],
        variadic: false,
    },
    RuntimeFn {
        name: "culebra_array_set",
        ret: "void",
        params: &["ptr", "i64", "i64"],
        variadic: false,
    },
];

pub(super) fn declarations() -> String {
    RUNTIME_FUNCTIONS
        .iter()
        .map(|function| {
            let mut params = function.params.join(", ");
            if function.variadic {
                params.push_str(", ...");
            }
            format!("declare {} @{}({})", function.ret, function.name, params)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
