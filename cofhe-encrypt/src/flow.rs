use async_trait::async_trait;
use cofhe_zk::{EncryptableItem, EncryptedItemInput, ProofMetadata};

use crate::{
    error::EncryptResult,
    mock::MockFlow,
    production::ProductionFlow,
    steps::{EncryptStep, StepContext, StepTimeline},
};

/// Resolved inputs of one encryption.
pub(crate) struct RequestContext {
    pub(crate) items: Vec<EncryptableItem>,
    pub(crate) metadata: ProofMetadata,
    pub(crate) use_worker: bool,
}

/// The five steps every encryption path implements. Each step hands its
/// output to the next and reports the context its end event carries.
#[async_trait]
pub(crate) trait EncryptFlow: Send + Sync {
    type Keys: Send;
    type Packed: Send;
    type Proof: Send;

    fn mocked(&self) -> bool;

    async fn init_runtime(&self) -> EncryptResult<StepContext>;

    async fn fetch_keys(
        &self,
        request: &RequestContext,
    ) -> EncryptResult<(Self::Keys, StepContext)>;

    async fn pack(
        &self,
        request: &RequestContext,
        keys: Self::Keys,
    ) -> EncryptResult<(Self::Packed, StepContext)>;

    async fn prove(
        &self,
        request: &RequestContext,
        packed: Self::Packed,
    ) -> EncryptResult<(Self::Proof, StepContext)>;

    async fn verify(
        &self,
        request: &RequestContext,
        proof: Self::Proof,
    ) -> EncryptResult<(Vec<EncryptedItemInput>, StepContext)>;
}

/// Drives `flow` through the steps in order, bracketing each with its start
/// and end events. A failing step ends the run without an end event.
pub(crate) async fn run_flow<F: EncryptFlow>(
    flow: &F,
    request: &RequestContext,
    timeline: &mut StepTimeline,
) -> EncryptResult<Vec<EncryptedItemInput>> {
    timeline.start(EncryptStep::InitTfhe);
    let context = flow.init_runtime().await?;
    timeline.end(context);

    timeline.start(EncryptStep::FetchKeys);
    let (keys, context) = flow.fetch_keys(request).await?;
    timeline.end(context);

    timeline.start(EncryptStep::Pack);
    let (packed, context) = flow.pack(request, keys).await?;
    timeline.end(context);

    timeline.start(EncryptStep::Prove);
    let (proof, context) = flow.prove(request, packed).await?;
    timeline.end(context);

    timeline.start(EncryptStep::Verify);
    let (inputs, context) = flow.verify(request, proof).await?;
    timeline.end(context);

    Ok(inputs)
}

/// Production or mock, picked once per call from the chain id.
pub(crate) enum EncryptPath<'a> {
    Production(ProductionFlow<'a>),
    Mock(MockFlow<'a>),
}

impl EncryptPath<'_> {
    pub(crate) fn mocked(&self) -> bool {
        match self {
            Self::Production(flow) => flow.mocked(),
            Self::Mock(flow) => flow.mocked(),
        }
    }

    pub(crate) async fn run(
        &self,
        request: &RequestContext,
        timeline: &mut StepTimeline,
    ) -> EncryptResult<Vec<EncryptedItemInput>> {
        match self {
            Self::Production(flow) => run_flow(flow, request, timeline).await,
            Self::Mock(flow) => run_flow(flow, request, timeline).await,
        }
    }
}
