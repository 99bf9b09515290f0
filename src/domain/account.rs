use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "farmer")]
    Producer,
    Consumer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "producer" | "farmer" => Ok(Role::Producer),
            "consumer" => Ok(Role::Consumer),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProducerProfile {
    pub farm_name: String,
    pub farm_size: f64,
    pub crops: Vec<String>,
}

/// Role-specific attributes. Producer fields exist only on producer accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum AccountProfile {
    Producer(ProducerProfile),
    Consumer,
}

impl AccountProfile {
    pub fn role(&self) -> Role {
        match self {
            AccountProfile::Producer(_) => Role::Producer,
            AccountProfile::Consumer => Role::Consumer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Location {
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[serde(alias = "pincode")]
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Account {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub location: Location,
    pub profile: AccountProfile,
    #[serde(skip)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn role(&self) -> Role {
        self.profile.role()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn farm_name(&self) -> Option<&str> {
        match &self.profile {
            AccountProfile::Producer(producer) => Some(producer.farm_name.as_str()),
            AccountProfile::Consumer => None,
        }
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            name: self.full_name(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            role: self.role(),
            farm_name: self.farm_name().map(str::to_owned),
        }
    }

    pub fn apply(&mut self, patch: ProfilePatch, now: DateTime<Utc>) {
        if let Some(first_name) = patch.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            self.last_name = last_name;
        }
        if let Some(phone) = patch.phone {
            self.phone = phone;
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let AccountProfile::Producer(producer) = &mut self.profile {
            if let Some(farm_name) = patch.farm_name {
                producer.farm_name = farm_name;
            }
            if let Some(farm_size) = patch.farm_size {
                producer.farm_size = farm_size;
            }
            if let Some(crops) = patch.crops {
                producer.crops = crops;
            }
        }
        self.updated_at = now;
    }
}

/// Public view of an account embedded in orders and conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub location: Location,
    pub profile: AccountProfile,
    pub password_hash: String,
}

impl NewAccount {
    pub fn into_account(self, id: Uuid, now: DateTime<Utc>) -> Account {
        Account {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            location: self.location,
            profile: self.profile,
            password_hash: self.password_hash,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Farm fields are ignored for consumer accounts.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<Location>,
    pub farm_name: Option<String>,
    pub farm_size: Option<f64>,
    pub crops: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer() -> Account {
        NewAccount {
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            email: "asha@example.com".into(),
            phone: "9876543210".into(),
            location: Location {
                city: "Pune".into(),
                state: "Maharashtra".into(),
                postal_code: "411001".into(),
            },
            profile: AccountProfile::Consumer,
            password_hash: "hash".into(),
        }
        .into_account(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn consumer_patch_ignores_farm_fields() {
        let mut account = consumer();
        account.apply(
            ProfilePatch {
                phone: Some("9000000000".into()),
                farm_name: Some("Green Acres".into()),
                ..Default::default()
            },
            Utc::now(),
        );
        assert_eq!(account.phone, "9000000000");
        assert_eq!(account.profile, AccountProfile::Consumer);
        assert_eq!(account.summary().farm_name, None);
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(consumer()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["profile"]["role"], "consumer");
    }

    #[test]
    fn farmer_is_accepted_as_producer_alias() {
        let role: Role = serde_json::from_str("\"farmer\"").unwrap();
        assert_eq!(role, Role::Producer);
        assert_eq!("farmer".parse::<Role>().unwrap(), Role::Producer);
    }
}
