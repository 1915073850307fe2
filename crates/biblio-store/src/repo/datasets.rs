use biblio_core::Dataset;

use super::records::typed_record_ops;

typed_record_ops!(
    Dataset,
    get: get_dataset,
    get_many: get_datasets,
    save: save_dataset,
    update: update_dataset,
    mutate: mutate_dataset,
    each: each_dataset,
    each_history: each_dataset_history,
    between: datasets_between,
    after: datasets_after,
    history: dataset_history,
    as_of: dataset_as_of,
    purge: purge_dataset,
    purge_all: purge_all_datasets,
    count: count_datasets,
);
