//! Cache key construction
//!
//! Keys follow `<role>:<domain>:<subresource>:<id...>`. The cache layer does
//! no parameter hashing, so every input a producer depends on has to be a
//! segment of its key.

use crate::store::pattern::escape_glob;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Leading namespace segment of a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Teacher,
    Student,
    Class,
    Admin,
    Custom(String),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Teacher => write!(f, "teacher"),
            Role::Student => write!(f, "student"),
            Role::Class => write!(f, "class"),
            Role::Admin => write!(f, "admin"),
            Role::Custom(s) => write!(f, "{}", s),
        }
    }
}

/// Entry point for building keys
#[derive(Debug, Clone, Copy)]
pub struct CacheKey;

impl CacheKey {
    pub fn builder(role: Role) -> CacheKeyBuilder {
        CacheKeyBuilder::new(role)
    }
}

/// Builder for namespaced cache keys
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    role: Role,
    segments: Vec<String>,
}

impl CacheKeyBuilder {
    /// Start a key under `role`
    pub fn new(role: Role) -> Self {
        Self {
            role,
            segments: Vec::new(),
        }
    }

    /// Append a segment
    pub fn segment(mut self, segment: impl fmt::Display) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    /// Build the key
    pub fn build(self) -> String {
        let mut key = self.role.to_string();
        for segment in &self.segments {
            key.push(':');
            key.push_str(segment);
        }
        key
    }

    /// Glob matching every key under this prefix
    ///
    /// The prefix is escaped, so ids that happen to contain glob
    /// characters only match themselves.
    pub fn namespace(self) -> String {
        format!("{}:*", escape_glob(&self.build()))
    }
}

/// `teacher:dashboard:stats:<userId>`
pub fn teacher_dashboard_stats(user_id: &str) -> String {
    CacheKeyBuilder::new(Role::Teacher)
        .segment("dashboard")
        .segment("stats")
        .segment(user_id)
        .build()
}

/// `student:class:<userId>:<classId>`
pub fn student_class(user_id: &str, class_id: &str) -> String {
    CacheKeyBuilder::new(Role::Student)
        .segment("class")
        .segment(user_id)
        .segment(class_id)
        .build()
}

/// `student:evolution:<studentId>:<classId>`
pub fn student_evolution(student_id: &str, class_id: &str) -> String {
    CacheKeyBuilder::new(Role::Student)
        .segment("evolution")
        .segment(student_id)
        .segment(class_id)
        .build()
}

/// `class:<classId>:data:<userId>`
pub fn class_data(class_id: &str, user_id: &str) -> String {
    CacheKeyBuilder::new(Role::Class)
        .segment(class_id)
        .segment("data")
        .segment(user_id)
        .build()
}

/// `class:<classId>:roster`
pub fn class_roster(class_id: &str) -> String {
    CacheKeyBuilder::new(Role::Class)
        .segment(class_id)
        .segment("roster")
        .build()
}

/// `class:<classId>:report:<period>`
pub fn class_report(class_id: &str, period: &str) -> String {
    CacheKeyBuilder::new(Role::Class)
        .segment(class_id)
        .segment("report")
        .segment(period)
        .build()
}

/// `class:<classId>:*`
pub fn class_namespace(class_id: &str) -> String {
    CacheKeyBuilder::new(Role::Class).segment(class_id).namespace()
}

/// Every key a role holds for one user, e.g. `teacher:*:<userId>`
pub fn user_namespace(role: Role, user_id: &str) -> String {
    format!("{}:*:{}", role, escape_glob(user_id))
}

/// `student:class:*:<classId>`: every student's view of one class
pub fn students_in_class(class_id: &str) -> String {
    format!("student:class:*:{}", escape_glob(class_id))
}

/// `student:evolution:*:<classId>`: evolution data of every student in a class
pub fn evolution_in_class(class_id: &str) -> String {
    format!("student:evolution:*:{}", escape_glob(class_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::pattern::glob_match;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Teacher.to_string(), "teacher");
        assert_eq!(Role::Custom("parent".to_string()).to_string(), "parent");
    }

    #[test]
    fn test_key_builder() {
        let key = CacheKey::builder(Role::Admin)
            .segment("reports")
            .segment(2024)
            .build();
        assert_eq!(key, "admin:reports:2024");
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(teacher_dashboard_stats("T1"), "teacher:dashboard:stats:T1");
        assert_eq!(student_class("u1", "c9"), "student:class:u1:c9");
        assert_eq!(class_data("c9", "u1"), "class:c9:data:u1");
        assert_eq!(class_roster("c9"), "class:c9:roster");
        assert_eq!(class_report("c9", "2024-q1"), "class:c9:report:2024-q1");
        assert_eq!(student_evolution("s1", "c9"), "student:evolution:s1:c9");
    }

    #[test]
    fn test_namespaces_match_their_keys() {
        let ns = class_namespace("c9");
        assert_eq!(ns, "class:c9:*");
        assert!(glob_match(&ns, &class_data("c9", "u1")));
        assert!(glob_match(&ns, &class_roster("c9")));
        assert!(!glob_match(&ns, &class_roster("c90")));

        assert!(glob_match(&students_in_class("c9"), &student_class("u1", "c9")));
        assert!(glob_match(&evolution_in_class("c9"), &student_evolution("s1", "c9")));
        assert!(glob_match(
            &user_namespace(Role::Teacher, "T1"),
            &teacher_dashboard_stats("T1")
        ));
    }

    #[test]
    fn test_namespace_escapes_ids() {
        let ns = class_namespace("weird*id");
        assert!(glob_match(&ns, "class:weird*id:roster"));
        assert!(!glob_match(&ns, "class:weirdXid:roster"));
    }
}
