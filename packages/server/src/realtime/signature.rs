//! JSON の形の人が読める表現
//!
//! 形の違うペイロードを送ったクライアントに、期待するフィールドを
//! エラー返信で伝えるために使います。

/// デシリアライズ元の JSON の形を説明できる型
pub trait JsonSignature {
    fn signature() -> String;
}

macro_rules! primitive_signature {
    ($name:literal => $($ty:ty),+) => {
        $(
            impl JsonSignature for $ty {
                fn signature() -> String {
                    $name.to_string()
                }
            }
        )+
    };
}

primitive_signature!("int" => i16, i32, i64, u16, u32, u64, usize);
primitive_signature!("float" => f32, f64);
primitive_signature!("bool" => bool);
primitive_signature!("string" => String);
primitive_signature!("any" => serde_json::Value);

impl<T: JsonSignature> JsonSignature for Vec<T> {
    fn signature() -> String {
        format!("{}[]", T::signature())
    }
}

impl<T: JsonSignature> JsonSignature for Option<T> {
    fn signature() -> String {
        format!("{} | null", T::signature())
    }
}

/// `(フィールド名, フィールドの形)` の組からオブジェクトの形を組み立てる
///
/// ```
/// use rtchat_server::realtime::signature::{JsonSignature, object_signature};
///
/// let shape = object_signature(&[("chatId", i64::signature()), ("tags", Vec::<String>::signature())]);
/// assert_eq!(shape, "{\n\tchatId: int,\n\ttags: string[]\n}");
/// ```
pub fn object_signature(fields: &[(&str, String)]) -> String {
    let defs: Vec<String> = fields
        .iter()
        .map(|(name, signature)| format!("\t{}: {}", name, signature))
        .collect();
    format!("{{\n{}\n}}", defs.join(",\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Point;

    impl JsonSignature for Point {
        fn signature() -> String {
            object_signature(&[("x", f64::signature()), ("y", f64::signature())])
        }
    }

    #[test]
    fn test_nested_array_of_objects() {
        // テスト項目: オブジェクトの配列は "{...}[]" として表現される
        // given (前提条件):

        // when (操作):
        let signature = Vec::<Point>::signature();

        // then (期待する結果):
        assert_eq!(signature, "{\n\tx: float,\n\ty: float\n}[]");
    }

    #[test]
    fn test_optional_field() {
        // テスト項目: Option は null 許容として表現される
        // given (前提条件):

        // when (操作):
        let signature = Option::<String>::signature();

        // then (期待する結果):
        assert_eq!(signature, "string | null");
    }
}
