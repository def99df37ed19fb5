use mongodb::bson::{doc, oid::ObjectId, Bson, Document};

/// Collection holding registered people.
pub const COLLECTION: &str = "person";

pub const CPF: &str = "cpf";
pub const PASSWORD: &str = "password";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Fields a sign-up body must carry.
pub const MANDATORY_FIELDS: &[&str] = &[CPF, PASSWORD];

pub fn by_cpf(cpf: &str) -> Document {
    doc! { CPF: cpf }
}

/// Filter for a token subject. Subjects are stringified `_id`s, so a valid
/// hex object id is matched as an `ObjectId`, anything else as a plain string.
pub fn by_subject(subject: &str) -> Document {
    let id = match ObjectId::parse_str(subject) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(subject.to_string()),
    };
    doc! { "_id": id }
}

/// String form of a stored `_id`, as embedded in token subjects.
pub fn subject_of(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_roundtrips_object_id() {
        let oid = ObjectId::new();
        let subject = subject_of(&Bson::ObjectId(oid));
        assert_eq!(by_subject(&subject), doc! { "_id": oid });
    }

    #[test]
    fn test_non_hex_subject_matches_string_id() {
        assert_eq!(by_subject("abc"), doc! { "_id": "abc" });
        assert_eq!(subject_of(&Bson::Int32(5)), "5");
    }
}
