use biblio_core::Publication;

use super::records::typed_record_ops;

typed_record_ops!(
    Publication,
    get: get_publication,
    get_many: get_publications,
    save: save_publication,
    update: update_publication,
    mutate: mutate_publication,
    each: each_publication,
    each_history: each_publication_history,
    between: publications_between,
    after: publications_after,
    history: publication_history,
    as_of: publication_as_of,
    purge: purge_publication,
    purge_all: purge_all_publications,
    count: count_publications,
);
