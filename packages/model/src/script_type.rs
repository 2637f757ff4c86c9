//! Mapping from Rust types to the type names the script side resolves.

/// A Rust type with a counterpart in the script language.
///
/// The name is what a [`Parameter`](crate::Parameter) or a return type
/// declaration carries across the channel.
pub trait ScriptType {
    fn type_name() -> String;
}

macro_rules! primitive_script_type {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl ScriptType for $ty {
                fn type_name() -> String {
                    $name.to_string()
                }
            }
        )*
    };
}

primitive_script_type! {
    i32 => "System.Int32",
    i64 => "System.Int64",
    f64 => "System.Double",
    bool => "System.Boolean",
    String => "System.String",
    str => "System.String",
}

impl<T: ScriptType> ScriptType for Vec<T> {
    fn type_name() -> String {
        format!("{}[]", T::type_name())
    }
}

impl<T: ScriptType> ScriptType for [T] {
    fn type_name() -> String {
        format!("{}[]", T::type_name())
    }
}

impl<T: ScriptType + ?Sized> ScriptType for &T {
    fn type_name() -> String {
        T::type_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_names() {
        assert_eq!(i32::type_name(), "System.Int32");
        assert_eq!(f64::type_name(), "System.Double");
        assert_eq!(<&str>::type_name(), "System.String");
    }

    #[test]
    fn array_names() {
        assert_eq!(Vec::<i64>::type_name(), "System.Int64[]");
        assert_eq!(Vec::<Vec<bool>>::type_name(), "System.Boolean[][]");
    }
}
