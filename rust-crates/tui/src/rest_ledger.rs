use loud_game::{
    LedgerError,
    catalog::OperationDescriptor,
    ledger::{
        Confirmation,
        Ledger,
        OperationId,
        PollStatus,
        Signer,
    },
    market::{
        Currency,
        Offer,
    },
    record::{
        AccountState,
        Character,
        CharacterKind,
        Credential,
        Item,
        ItemKind,
    },
};
use reqwest::{
    Response,
    StatusCode,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;
use tracing::warn;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP adapter for a ledger node's REST gateway.
#[derive(Clone)]
pub struct RestLedger {
    base_url: Url,
    http: reqwest::Client,
}

impl RestLedger {
    pub fn new(base_url: Url) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                LedgerError::Network(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { base_url, http })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, LedgerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                LedgerError::Protocol(format!("{} cannot be a base url", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, segments: &[&str]) -> Result<Response, LedgerError> {
        let url = self.endpoint(segments)?;
        self.http.get(url).send().await.map_err(unreachable)
    }
}

fn unreachable(err: reqwest::Error) -> LedgerError {
    LedgerError::Network(err.to_string())
}

async fn decode<T: for<'de> Deserialize<'de>>(
    res: Response,
    what: &str,
) -> Result<T, LedgerError> {
    let status = res.status();
    if !status.is_success() {
        let body = res
            .text()
            .await
            .unwrap_or_else(|_| "<unavailable body>".to_string());
        return Err(LedgerError::Protocol(format!(
            "ledger responded with {status} when fetching {what}: {body}"
        )));
    }
    res.json()
        .await
        .map_err(|err| LedgerError::Protocol(format!("invalid {what} payload: {err}")))
}

impl Ledger for RestLedger {
    async fn submit_operation(
        &self,
        signer: &Signer,
        descriptor: &OperationDescriptor,
    ) -> Result<OperationId, LedgerError> {
        let body = SubmitRequestDto {
            player: &signer.player,
            signature: signer.sign(descriptor)?,
            operation: descriptor,
        };
        let res = self
            .http
            .post(self.endpoint(&["operations"])?)
            .json(&body)
            .send()
            .await
            .map_err(unreachable)?;
        let status = res.status();
        if status.is_client_error() {
            let reason = res
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(LedgerError::Submission(reason));
        }
        let dto: SubmitResponseDto = decode(res, "submission receipt").await?;
        Ok(OperationId::new(dto.id))
    }

    async fn poll_operation(&self, id: &OperationId) -> Result<PollStatus, LedgerError> {
        let res = self.get(&["operations", id.as_str()]).await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(PollStatus::Pending);
        }
        let dto: OperationStatusDto = decode(res, "operation status").await?;
        Ok(dto.into())
    }

    async fn query_account(&self, player: &str) -> Result<AccountState, LedgerError> {
        let res = self.get(&["accounts", player]).await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(AccountState::default());
        }
        let dto: AccountDto = decode(res, "account").await?;
        dto.try_into()
    }

    async fn provision_credential(&self, player: &str) -> Result<Credential, LedgerError> {
        let res = self
            .http
            .post(self.endpoint(&["accounts", player, "credential"])?)
            .send()
            .await
            .map_err(unreachable)?;
        let dto: CredentialDto = decode(res, "credential").await?;
        Ok(Credential::new(dto.credential))
    }

    async fn list_offers(&self) -> Result<Vec<Offer>, LedgerError> {
        let res = self.get(&["offers"]).await?;
        decode(res, "offers").await
    }
}

#[derive(Serialize)]
struct SubmitRequestDto<'a> {
    player: &'a str,
    signature: String,
    operation: &'a OperationDescriptor,
}

#[derive(Deserialize)]
struct SubmitResponseDto {
    id: String,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OperationStatusDto {
    Pending,
    Confirmed {
        #[serde(default)]
        message: String,
        amount: Option<u64>,
    },
    Rejected {
        reason: String,
    },
}

impl From<OperationStatusDto> for PollStatus {
    fn from(dto: OperationStatusDto) -> Self {
        match dto {
            OperationStatusDto::Pending => PollStatus::Pending,
            OperationStatusDto::Confirmed { message, amount } => {
                PollStatus::Confirmed(Confirmation { message, amount })
            }
            OperationStatusDto::Rejected { reason } => PollStatus::Rejected(reason),
        }
    }
}

#[derive(Deserialize)]
struct CredentialDto {
    credential: String,
}

#[derive(Deserialize)]
struct AccountDto {
    #[serde(default)]
    balances: Vec<CoinDto>,
    #[serde(default)]
    items: Vec<ItemDto>,
    #[serde(default)]
    characters: Vec<CharacterDto>,
}

/// Amounts travel as decimal strings.
#[derive(Deserialize)]
struct CoinDto {
    denom: String,
    amount: String,
}

#[derive(Deserialize)]
struct ItemDto {
    id: String,
    name: String,
    level: u32,
    attack: u32,
}

#[derive(Deserialize)]
struct CharacterDto {
    id: String,
    name: String,
    level: u32,
    #[serde(default)]
    xp: u64,
}

impl TryFrom<AccountDto> for AccountState {
    type Error = LedgerError;

    fn try_from(dto: AccountDto) -> Result<Self, Self::Error> {
        let mut account = AccountState::default();
        for coin in dto.balances {
            let amount: u64 = coin.amount.parse().map_err(|_| {
                LedgerError::Protocol(format!(
                    "invalid {} amount `{}`",
                    coin.denom, coin.amount
                ))
            })?;
            if coin.denom == Currency::Gold.denom() {
                account.gold = amount;
            } else if coin.denom == Currency::Pylon.denom() {
                account.pylon = amount;
            }
        }
        account.items = dto
            .items
            .into_iter()
            .filter_map(|item| match ItemKind::from_name(&item.name) {
                Some(kind) => Some(Item {
                    id: item.id,
                    kind,
                    level: item.level,
                    attack: item.attack,
                }),
                None => {
                    warn!(id = %item.id, name = %item.name, "skipping unknown item");
                    None
                }
            })
            .collect();
        account.characters = dto
            .characters
            .into_iter()
            .filter_map(|character| match CharacterKind::from_name(&character.name) {
                Some(kind) => Some(Character {
                    id: character.id,
                    kind,
                    level: character.level,
                    xp: character.xp,
                }),
                None => {
                    warn!(id = %character.id, name = %character.name, "skipping unknown character");
                    None
                }
            })
            .collect();
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn account(json: &str) -> Result<AccountState, LedgerError> {
        let dto: AccountDto = serde_json::from_str(json).unwrap();
        dto.try_into()
    }

    #[test]
    fn account_dto__maps_denominations_and_known_assets() {
        // given
        let json = r#"{
            "balances": [
                {"denom": "loudcoin", "amount": "120"},
                {"denom": "pylon", "amount": "7"},
                {"denom": "stake", "amount": "99"}
            ],
            "items": [
                {"id": "i1", "name": "Wooden sword", "level": 2, "attack": 6},
                {"id": "i2", "name": "Bronze shield", "level": 1, "attack": 0}
            ],
            "characters": [{"id": "c1", "name": "Tiger", "level": 1}]
        }"#;

        // when
        let account = account(json).unwrap();

        // then
        assert_eq!(account.gold, 120);
        assert_eq!(account.pylon, 7);
        assert_eq!(
            account.items,
            vec![Item {
                id: "i1".into(),
                kind: ItemKind::WoodenSword,
                level: 2,
                attack: 6,
            }]
        );
        assert_eq!(account.characters.len(), 1);
        assert_eq!(account.characters[0].kind, CharacterKind::Tiger);
        assert_eq!(account.characters[0].xp, 0);
    }

    #[test]
    fn account_dto__missing_sections__is_empty_account() {
        assert_eq!(account("{}").unwrap(), AccountState::default());
    }

    #[test]
    fn account_dto__non_numeric_amount__is_protocol_error() {
        let err = account(r#"{"balances": [{"denom": "loudcoin", "amount": "lots"}]}"#)
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::Protocol("invalid loudcoin amount `lots`".to_string())
        );
    }

    #[test]
    fn operation_status_dto__maps_every_status() {
        let status = |json: &str| -> PollStatus {
            serde_json::from_str::<OperationStatusDto>(json).unwrap().into()
        };

        assert_eq!(status(r#"{"status": "pending"}"#), PollStatus::Pending);
        assert_eq!(
            status(r#"{"status": "confirmed", "message": "bought", "amount": 5}"#),
            PollStatus::Confirmed(Confirmation {
                message: "bought".into(),
                amount: Some(5),
            })
        );
        assert_eq!(
            status(r#"{"status": "rejected", "reason": "insufficient gold"}"#),
            PollStatus::Rejected("insufficient gold".into())
        );
    }

    #[test]
    fn endpoint__escapes_player_names_and_keeps_base_path() {
        // given
        let ledger = RestLedger::new(Url::parse("http://localhost:1317/loud/").unwrap()).unwrap();

        // when
        let url = ledger.endpoint(&["accounts", "bob smith", "credential"]).unwrap();

        // then
        assert_eq!(
            url.as_str(),
            "http://localhost:1317/loud/accounts/bob%20smith/credential"
        );
    }
}
