/// Closed set of native-backed callables seeded into the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    Input,
    Len,
    Chr,
    Ord,
    Int,
    Float,
    Str,
    Abs,
    ReadFile,
    ReadLines,
    NewMap,
    NewSet,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Input => "input",
            Self::Len => "len",
            Self::Chr => "chr",
            Self::Ord => "ord",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Abs => "abs",
            Self::ReadFile => "read_file",
            Self::ReadLines => "read_lines",
            Self::NewMap => "Map",
            Self::NewSet => "Set",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "print" => Some(Self::Print),
            "input" => Some(Self::Input),
            "len" => Some(Self::Len),
            "chr" => Some(Self::Chr),
            "ord" => Some(Self::Ord),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "str" => Some(Self::Str),
            "abs" => Some(Self::Abs),
            "read_file" => Some(Self::ReadFile),
            "read_lines" => Some(Self::ReadLines),
            "Map" => Some(Self::NewMap),
            "Set" => Some(Self::NewSet),
            _ => None,
        }
    }

    pub fn all() -> &'static [Builtin] {
        &[
            Self::Print,
            Self::Input,
            Self::Len,
            Self::Chr,
            Self::Ord,
            Self::Int,
            Self::Float,
            Self::Str,
            Self::Abs,
            Self::ReadFile,
            Self::ReadLines,
            Self::NewMap,
            Self::NewSet,
        ]
    }
}
