#[derive(Debug, Clone, Default)]
pub struct ListModelsRequest;
