// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{
        Context,
        handlers::{access::Access, check_length, packs::authorized_pack},
    },
    db::models::{CardChanges, CardType, NewCard},
    error::{ApiError, ApiResult},
    store::{CardOptionInput, CardWithOptions},
};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CardOptionView {
    pub id: Uuid,
    pub text: String,
    pub is_correct: bool,
    pub order: i32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub question: String,
    pub options: Vec<CardOptionView>,
    pub pack_id: Uuid,
}

impl From<CardWithOptions> for CardView {
    fn from(card: CardWithOptions) -> Self {
        Self {
            id: card.card.id,
            card_type: card.card.card_type,
            question: card.card.question,
            options: card
                .options
                .into_iter()
                .map(|option| CardOptionView {
                    id: option.id,
                    text: option.text,
                    is_correct: option.is_correct,
                    order: option.position,
                })
                .collect(),
            pack_id: card.card.pack_id,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CardOptionPayload {
    pub text: String,
    pub is_correct: bool,
    pub order: Option<i32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardInput {
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub question: String,
    #[serde(default)]
    pub options: Vec<CardOptionPayload>,
    pub pack_id: Uuid,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCardInput {
    #[serde(rename = "type")]
    pub card_type: Option<CardType>,
    pub question: Option<String>,
    /// Replaces every existing option when present.
    pub options: Option<Vec<CardOptionPayload>>,
}

/// Validates option texts and assigns each option its display order.
///
/// Options without an explicit `order` are placed at their position in the request.
fn option_inputs(options: Vec<CardOptionPayload>) -> ApiResult<Vec<CardOptionInput>> {
    options
        .into_iter()
        .enumerate()
        .map(|(index, option)| {
            check_length("option text", &option.text, 1, 200)?;
            Ok(CardOptionInput {
                text: option.text.trim().to_string(),
                is_correct: option.is_correct,
                position: option.order.unwrap_or(index as i32),
            })
        })
        .collect()
}

/// Enforces the option count and correct-answer rules of each card type.
pub fn check_card_options(card_type: CardType, options: &[CardOptionInput]) -> ApiResult<()> {
    let correct = options.iter().filter(|option| option.is_correct).count();
    let bad_request = |message: String| -> ApiResult<()> { Err(ApiError::BadRequest(message)) };
    match card_type {
        CardType::MultipleChoice | CardType::Checkbox => {
            if !(2..=10).contains(&options.len()) {
                return bad_request(format!(
                    "A card of type: '{card_type}' must have between 2 and 10 options"
                ));
            }
            if card_type == CardType::MultipleChoice && correct != 1 {
                return bad_request(format!(
                    "Card of type: '{card_type}' must have exactly one correct answer"
                ));
            }
            if card_type == CardType::Checkbox && correct < 1 {
                return bad_request(format!(
                    "Card of type: '{card_type}' must have at least one correct answer"
                ));
            }
        }
        CardType::TrueFalse => {
            if options.len() != 2 {
                return bad_request(format!(
                    "A card of type '{card_type}' must have exactly 2 options"
                ));
            }
            if correct != 1 {
                return bad_request(format!(
                    "Card of type: '{card_type}' must have exactly one correct answer"
                ));
            }
        }
        CardType::FillBlank => {
            if options.len() != 1 {
                return bad_request(format!(
                    "A card of type '{card_type}' must have exactly 1 option"
                ));
            }
            if correct != 1 {
                return bad_request(format!(
                    "The option of a card of type '{card_type}' must be marked correct"
                ));
            }
        }
    }
    Ok(())
}

async fn load_card(ctx: &Context, id: Uuid) -> ApiResult<CardWithOptions> {
    ctx.store()
        .card_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Card with ID: '{id}' not found")))
}

/// Loads a card after checking `access` to the pack it belongs to.
async fn authorized_card(ctx: &Context, id: Uuid, access: Access) -> ApiResult<CardWithOptions> {
    ctx.current_user().await?;
    let card = load_card(ctx, id).await?;
    authorized_pack(ctx, card.card.pack_id, access).await?;
    Ok(card)
}

pub async fn create_card(ctx: &Context, input: CreateCardInput) -> ApiResult<CardView> {
    ctx.current_user().await?;
    check_length("question", &input.question, 10, 1000)?;
    let options = option_inputs(input.options)?;
    check_card_options(input.card_type, &options)?;
    authorized_pack(ctx, input.pack_id, Access::Mutating).await?;

    let new_card = NewCard {
        id: Uuid::now_v7(),
        pack_id: input.pack_id,
        card_type: input.card_type,
        question: input.question.trim().to_string(),
    };
    let card = ctx.store().insert_card(new_card, options).await?;
    tracing::debug!(card_id = %card.card.id, pack_id = %input.pack_id, "Created card");
    Ok(CardView::from(card))
}

pub async fn get_card(ctx: &Context, id: Uuid) -> ApiResult<CardView> {
    let card = authorized_card(ctx, id, Access::ReadOnly).await?;
    Ok(CardView::from(card))
}

pub async fn list_cards_for_pack(ctx: &Context, pack_id: Uuid) -> ApiResult<Vec<CardView>> {
    authorized_pack(ctx, pack_id, Access::ReadOnly).await?;
    let cards = ctx.store().list_cards_for_pack(pack_id).await?;
    Ok(cards.into_iter().map(CardView::from).collect())
}

/// Updates type and question; supplied options replace the existing ones wholesale.
///
/// The resulting combination of type and options is validated before anything is written.
pub async fn update_card(ctx: &Context, id: Uuid, input: UpdateCardInput) -> ApiResult<CardView> {
    let existing = authorized_card(ctx, id, Access::Mutating).await?;
    if let Some(question) = &input.question {
        check_length("question", question, 5, 1000)?;
    }

    let options = input.options.map(option_inputs).transpose()?;
    if input.card_type.is_some() || options.is_some() {
        let card_type = input.card_type.unwrap_or(existing.card.card_type);
        match &options {
            Some(options) => check_card_options(card_type, options)?,
            None => {
                let current: Vec<CardOptionInput> = existing
                    .options
                    .iter()
                    .map(|option| CardOptionInput {
                        text: option.text.clone(),
                        is_correct: option.is_correct,
                        position: option.position,
                    })
                    .collect();
                check_card_options(card_type, &current)?;
            }
        }
    }

    let changes = CardChanges {
        card_type: input.card_type,
        question: input.question.map(|question| question.trim().to_string()),
        updated_at: Utc::now(),
    };
    let card = ctx.store().update_card(id, changes, options).await?;
    Ok(CardView::from(card))
}

pub async fn delete_card(ctx: &Context, id: Uuid) -> ApiResult<()> {
    authorized_card(ctx, id, Access::Mutating).await?;
    if !ctx.store().delete_card(id).await? {
        return Err(ApiError::NotFound(format!("Card with ID: '{id}' not found")));
    }
    tracing::debug!(card_id = %id, "Deleted card");
    Ok(())
}
