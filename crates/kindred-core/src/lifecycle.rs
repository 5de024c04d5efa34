//! Campaign lifecycle engine.
//!
//! Campaigns are created as drafts, may be edited and published while in
//! draft, may only be ended once published, and are frozen once ended. Only
//! drafts can be deleted.

use anyhow::anyhow;
use tracing::{debug, info, warn};

use kindred_types::api::CampaignIn;
use kindred_types::models::{Campaign, CampaignState};

use crate::error::CampaignError;
use crate::store::CampaignStore;

pub fn create<S: CampaignStore + ?Sized>(store: &S, input: &CampaignIn) -> Result<Campaign, CampaignError> {
    info!("Creating campaign '{}'", input.name);

    if store.campaign_by_name(&input.name)?.is_some() {
        return Err(CampaignError::DuplicateName(input.name.clone()));
    }

    if input.requested_state() != Some(CampaignState::Draft) {
        return Err(CampaignError::InvalidInitialState);
    }

    let id = store.insert_campaign(&input.name, &input.template, CampaignState::Draft)?;
    debug!("Campaign '{}' stored with id {}", input.name, id);

    Ok(Campaign {
        id,
        name: input.name.clone(),
        template: input.template.clone(),
        state: CampaignState::Draft,
    })
}

/// Apply `input` to campaign `id` and return the stored result.
///
/// Drafts take the submitted name, template and state. Published campaigns
/// only take the state; a submitted name or template is dropped.
pub fn update<S: CampaignStore + ?Sized>(
    store: &S,
    id: i64,
    input: &CampaignIn,
) -> Result<Campaign, CampaignError> {
    info!("Updating campaign with id {}", id);

    let existing = store.campaign_by_id(id)?.ok_or(CampaignError::NotFound(id))?;

    if existing.state == CampaignState::Ended {
        return Err(CampaignError::CampaignEnded(id));
    }

    if let Some(holder) = store.campaign_by_name(&input.name)? {
        if holder.id != id {
            return Err(CampaignError::DuplicateName(input.name.clone()));
        }
    }

    let requested = input
        .requested_state()
        .ok_or(CampaignError::InvalidStateSelection)?;

    let next = existing
        .state
        .transition_to(requested)
        .map_err(|e| CampaignError::from_transition(id, e))?;

    let current = existing.state;
    let updated = match current {
        CampaignState::Draft => Campaign {
            id,
            name: input.name.clone(),
            template: input.template.clone(),
            state: next,
        },
        _ => {
            if input.name != existing.name || input.template != existing.template {
                warn!(
                    "Campaign {} is {}: ignoring submitted name/template",
                    id, current
                );
            }
            Campaign {
                state: next,
                ..existing
            }
        }
    };

    let rows = store.update_campaign(&updated)?;
    if rows != 1 {
        return Err(anyhow!("expected to update 1 campaign row for id {}, updated {}", id, rows).into());
    }

    store.campaign_by_id(id)?.ok_or(CampaignError::NotFound(id))
}

pub fn delete<S: CampaignStore + ?Sized>(store: &S, id: i64) -> Result<(), CampaignError> {
    info!("Deleting campaign with id {}", id);

    let existing = store.campaign_by_id(id)?.ok_or(CampaignError::NotFound(id))?;
    if existing.state != CampaignState::Draft {
        return Err(CampaignError::NotDraft(id));
    }

    store.delete_campaign(id)?;
    Ok(())
}

pub fn get<S: CampaignStore + ?Sized>(store: &S, id: i64) -> Result<Campaign, CampaignError> {
    store.campaign_by_id(id)?.ok_or(CampaignError::NotFound(id))
}

/// All campaigns, or only those in `state`.
pub fn list<S: CampaignStore + ?Sized>(
    store: &S,
    state: Option<CampaignState>,
) -> Result<Vec<Campaign>, CampaignError> {
    Ok(store.list_campaigns(state)?)
}

pub fn list_published<S: CampaignStore + ?Sized>(store: &S) -> Result<Vec<Campaign>, CampaignError> {
    list(store, Some(CampaignState::Published))
}

/// Public view of a single campaign; only published campaigns are visible.
pub fn get_published<S: CampaignStore + ?Sized>(store: &S, id: i64) -> Result<Campaign, CampaignError> {
    let campaign = get(store, id)?;
    if campaign.state != CampaignState::Published {
        return Err(CampaignError::NotPublished(id));
    }
    Ok(campaign)
}
