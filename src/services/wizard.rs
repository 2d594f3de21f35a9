//! Read side of the task-assignment wizard. Writes go through
//! [`AssignmentService::assign_tasks`](super::assignments::AssignmentService::assign_tasks).

use serde::Serialize;
use sqlx::PgPool;

use crate::{
    error::{AppError, AppResult},
    models::{auth::Actor, child::Child, client::ParentProfile, taxonomy::SpeechArea},
    services::{
        children::ChildService, clients::ClientService, taxonomy::TaxonomyService, therapists::TherapistService,
    },
};

#[derive(Debug, Serialize)]
pub struct WizardContext {
    pub client: ParentProfile,
    pub children: Vec<Child>,
    pub speech_areas: Vec<SpeechArea>,
}

pub struct WizardService;

impl WizardService {
    /// Clients the caller may pick from: their own caseload for a therapist,
    /// every client for a superuser.
    pub async fn clients(pool: &PgPool, actor: &Actor) -> AppResult<Vec<ParentProfile>> {
        if actor.has_full_access() {
            return ClientService::list(pool, actor, &Default::default()).await;
        }
        ClientService::for_therapist(pool, actor).await
    }

    /// Everything the wizard needs for one client, behind the same gate as
    /// the batch assignment itself.
    pub async fn context(pool: &PgPool, actor: &Actor, client_id: i64) -> AppResult<WizardContext> {
        let own_profile = if actor.has_full_access() {
            None
        } else {
            Some(TherapistService::own_profile(pool, actor).await?)
        };
        let client = ClientService::get(pool, actor, client_id).await?;
        if let Some(profile) = own_profile {
            if client.assigned_therapist_id != Some(profile.id) {
                return Err(AppError::forbidden("You can only assign tasks to your own clients."));
            }
        }

        let children = ChildService::list_for_parent(pool, actor, client.id).await?;
        let speech_areas = TaxonomyService::list_speech_areas(pool).await?;
        Ok(WizardContext {
            client,
            children,
            speech_areas,
        })
    }
}
