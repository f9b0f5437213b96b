//! Library members.

use common::{AggregateId, AggregateKind};
use serde::{Deserialize, Serialize};
use write_store::{Record, UniqueKey};

use crate::aggregate::{Aggregate, ReadView, overlay};
use crate::{Result, validate};

/// A registered library member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: AggregateId,
    pub member_number: String,
    pub name: String,
    pub address: String,
    pub email: String,
}

/// Create/update request for a member.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemberDraft {
    pub member_number: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AggregateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ReadView for MemberView {
    fn merge(&mut self, patch: Self) {
        overlay!(self, patch; id, member_number, name, address, email);
    }
}

impl Record for Member {
    const KIND: AggregateKind = AggregateKind::Member;

    fn id(&self) -> AggregateId {
        self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![
            UniqueKey::new("member_number", &self.member_number),
            UniqueKey::new("email", &self.email),
        ]
    }
}

impl Aggregate for Member {
    type Draft = MemberDraft;
    type View = MemberView;

    fn create(id: AggregateId, draft: MemberDraft) -> Result<Self> {
        let member_number = validate::text("member_number", draft.member_number, 3, 20)?;
        let name = validate::text("name", draft.name, 3, 100)?;
        let address = validate::text("address", draft.address, 1, 255)?;
        let email = validate::email("email", draft.email)?;

        Ok(Member {
            id,
            member_number,
            name,
            address,
            email,
        })
    }

    fn update(&self, draft: MemberDraft) -> Result<Self> {
        Member::create(self.id, draft)
    }

    fn to_view(&self) -> MemberView {
        MemberView {
            id: Some(self.id),
            member_number: Some(self.member_number.clone()),
            name: Some(self.name.clone()),
            address: Some(self.address.clone()),
            email: Some(self.email.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DomainError;

    fn draft() -> MemberDraft {
        MemberDraft {
            member_number: Some("A001".into()),
            name: Some("Siti Rahma".into()),
            address: Some("Jl. Merdeka 1".into()),
            email: Some("a@test.com".into()),
        }
    }

    #[test]
    fn valid_draft_creates_member() {
        let id = AggregateId::new();
        let member = Member::create(id, draft()).unwrap();
        assert_eq!(member.id, id);
        assert_eq!(member.member_number, "A001");
        assert_eq!(
            member.unique_keys(),
            vec![
                UniqueKey::new("member_number", "A001"),
                UniqueKey::new("email", "a@test.com"),
            ]
        );
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let mut short_number = draft();
        short_number.member_number = Some("A1".into());
        assert!(matches!(
            Member::create(AggregateId::new(), short_number),
            Err(DomainError::InvalidInput(_))
        ));

        let mut bad_email = draft();
        bad_email.email = Some("not-an-email".into());
        assert!(Member::create(AggregateId::new(), bad_email).is_err());

        let mut long_address = draft();
        long_address.address = Some("x".repeat(256));
        assert!(Member::create(AggregateId::new(), long_address).is_err());

        let mut missing_name = draft();
        missing_name.name = None;
        assert!(Member::create(AggregateId::new(), missing_name).is_err());
    }

    #[test]
    fn update_keeps_the_id() {
        let member = Member::create(AggregateId::new(), draft()).unwrap();
        let mut changed = draft();
        changed.name = Some("Siti R.".into());

        let updated = member.update(changed).unwrap();
        assert_eq!(updated.id, member.id);
        assert_eq!(updated.name, "Siti R.");
    }

    #[test]
    fn view_merge_overlays_present_fields_only() {
        let member = Member::create(AggregateId::new(), draft()).unwrap();
        let mut view = member.to_view();
        view.merge(MemberView {
            email: Some("new@test.com".into()),
            ..Default::default()
        });

        assert_eq!(view.email.as_deref(), Some("new@test.com"));
        assert_eq!(view.member_number.as_deref(), Some("A001"));
    }
}
